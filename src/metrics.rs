//! Prometheus counters for sessions, commands, replies and login outcomes.
//! Compiled to no-ops when the `prometheus` feature is off; exposing the
//! gathered metrics over HTTP is left to the embedding process.

#[cfg(feature = "prometheus")]
mod imp {
    use crate::server::ControlChanErrorKind;
    use crate::server::{Command, Reply};
    use lazy_static::lazy_static;
    use prometheus::{IntCounterVec, IntGauge, opts, register_int_counter_vec, register_int_gauge};

    lazy_static! {
        static ref FTP_SESSIONS: IntGauge = register_int_gauge!(opts!("ftp_sessions_total", "Total number of FTP sessions.")).unwrap();
        static ref FTP_COMMAND_TOTAL: IntCounterVec =
            register_int_counter_vec!("ftp_command_total", "Total number of commands received.", &["command"]).unwrap();
        static ref FTP_REPLY_TOTAL: IntCounterVec =
            register_int_counter_vec!("ftp_reply_total", "Total number of reply codes sent to clients.", &["range"]).unwrap();
        static ref FTP_ERROR_TOTAL: IntCounterVec = register_int_counter_vec!("ftp_error_total", "Total number of errors encountered.", &["type"]).unwrap();
        static ref FTP_AUTH_TOTAL: IntCounterVec =
            register_int_counter_vec!("ftp_auth_total", "Login attempts by outcome and method or reason.", &["outcome", "detail"]).unwrap();
    }

    pub fn inc_session() {
        FTP_SESSIONS.inc();
    }

    pub fn dec_session() {
        FTP_SESSIONS.dec();
    }

    pub fn add_command_metric(cmd: &Command) {
        let cmd_str = format!("{:?}", cmd);
        let label = cmd_str.split(&[' ', '{'][..]).next().unwrap_or("unknown").to_lowercase();
        FTP_COMMAND_TOTAL.with_label_values(&[&label]).inc();
    }

    pub fn add_reply_metric(reply: &Reply) {
        let code = match reply {
            Reply::None => return,
            Reply::CodeAndMsg { code, .. } | Reply::MultiLine { code, .. } => *code,
        };
        let range = format!("{}xx", code as u32 / 100);
        FTP_REPLY_TOTAL.with_label_values(&[&range]).inc();
    }

    pub fn add_error_metric(kind: &ControlChanErrorKind) {
        let label = kind.to_string().split_whitespace().next().unwrap_or("unknown").to_lowercase();
        FTP_ERROR_TOTAL.with_label_values(&[&label]).inc();
    }

    pub fn add_auth_success(method: &str) {
        FTP_AUTH_TOTAL.with_label_values(&["success", method]).inc();
    }

    pub fn add_auth_failure(reason: &str) {
        FTP_AUTH_TOTAL.with_label_values(&["failure", reason]).inc();
    }
}

#[cfg(feature = "prometheus")]
pub(crate) use imp::*;

#[cfg(not(feature = "prometheus"))]
mod noop {
    use crate::server::{Command, ControlChanErrorKind, Reply};

    pub fn inc_session() {}
    pub fn dec_session() {}
    pub fn add_command_metric(_cmd: &Command) {}
    pub fn add_reply_metric(_reply: &Reply) {}
    pub fn add_error_metric(_kind: &ControlChanErrorKind) {}
    pub fn add_auth_success(_method: &str) {}
    pub fn add_auth_failure(_reason: &str) {}
}

#[cfg(not(feature = "prometheus"))]
pub(crate) use noop::*;
