//! Result renderers: a human-readable table and a machine-readable JSON
//! document over the ordered result list.

use beartrap_core::{AccountResult, Result};

pub fn render_table(results: &[AccountResult]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<32} {:<8} {:<14} {:<10} {}\n",
        "account", "status", "error", "credits", "tier"
    ));
    for r in results {
        let status = if r.success { "ok" } else { "failed" };
        let error = r.error.map(|e| e.as_str()).unwrap_or("-");
        let credits = r
            .credits
            .map(|c| format!("{:.1}", c))
            .unwrap_or_else(|| "-".to_string());
        let tier = r.tier.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "{:<32} {:<8} {:<14} {:<10} {}\n",
            r.email, status, error, credits, tier
        ));
    }
    let ok = results.iter().filter(|r| r.success).count();
    out.push_str(&format!("\n{}/{} accounts succeeded\n", ok, results.len()));
    out
}

pub fn render_json(results: &[AccountResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beartrap_core::{AccountResult, AcquireFailure, TokenRecord};

    fn sample() -> Vec<AccountResult> {
        vec![
            AccountResult::success("a@x.com", &TokenRecord::new("T1")),
            AccountResult::failure("b@x.com", AcquireFailure::LoginTimeout),
        ]
    }

    #[test]
    fn test_table_lists_every_account() {
        let table = render_table(&sample());
        assert!(table.contains("a@x.com"));
        assert!(table.contains("b@x.com"));
        assert!(table.contains("login_timeout"));
        assert!(table.contains("1/2 accounts succeeded"));
    }

    #[test]
    fn test_json_preserves_order_and_taxonomy() {
        let json = render_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["email"], "a@x.com");
        assert_eq!(arr[1]["error"], "login_timeout");
    }
}
