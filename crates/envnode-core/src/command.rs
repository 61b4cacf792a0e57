//! Operator commands received on `<prefix>/<device>/cmd`.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReportKind {
    Crash,
    Memory,
    Sleep,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemoteCommand {
    /// `diag=on|off`
    SetDiagnostic(bool),
    /// `full=on|off`
    SetFullOnly(bool),
    /// `sleep=<seconds>`; clamped by the scheduler.
    SetSleepInterval(u32),
    /// `sleep=adaptive`
    AdaptiveSleep,
    /// `restart`
    Restart,
    /// `report=crash|memory|sleep`
    Report(ReportKind),
    /// `reset=wakes`
    ResetWakeCount,
}

impl RemoteCommand {
    pub fn parse(payload: &str) -> Option<Self> {
        let payload = payload.trim();
        let (name, value) = match payload.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (payload, ""),
        };

        match (name, value) {
            ("diag", value) => parse_switch(value).map(Self::SetDiagnostic),
            ("full", value) => parse_switch(value).map(Self::SetFullOnly),
            ("sleep", "adaptive") => Some(Self::AdaptiveSleep),
            ("sleep", value) => value.parse::<u32>().ok().map(Self::SetSleepInterval),
            ("restart", "") => Some(Self::Restart),
            ("report", "crash") => Some(Self::Report(ReportKind::Crash)),
            ("report", "memory") => Some(Self::Report(ReportKind::Memory)),
            ("report", "sleep") => Some(Self::Report(ReportKind::Sleep)),
            ("reset", "wakes") => Some(Self::ResetWakeCount),
            _ => None,
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}
