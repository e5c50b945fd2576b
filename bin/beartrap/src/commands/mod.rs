pub mod accounts;
pub mod daemon_cmd;
pub mod doctor;
pub mod fetch;
pub mod tokens;
