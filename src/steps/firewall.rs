//! Firewall rules through `ufw`.
//!
//! `ufw allow` skips rules that already exist, so repeating the stage is safe.

use strum::Display;

use crate::command::StepCommand;

/// Ports the mail stack serves: SMTP, HTTP, HTTPS, submission, IMAPS
pub const REQUIRED_PORTS: &[u16] = &[25, 80, 443, 587, 993];

/// Transport protocol of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

/// `ufw allow <port>/<proto>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirewallRule {
    pub port: u16,
    pub protocol: Protocol,
}

impl FirewallRule {
    pub fn allow_tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl StepCommand for FirewallRule {
    fn program(&self) -> &'static str {
        "ufw"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["allow".to_string(), format!("{}/{}", self.port, self.protocol)]
    }
}

/// One rule per required port
pub fn required_rules() -> Vec<FirewallRule> {
    REQUIRED_PORTS.iter().map(|&p| FirewallRule::allow_tcp(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_args() {
        let rule = FirewallRule::allow_tcp(587);
        assert_eq!(rule.to_spec().command_line(), "ufw allow 587/tcp");
        assert_eq!(Protocol::Tcp.to_string(), "tcp");
    }

    #[test]
    fn test_required_rules_cover_required_ports() {
        let ports: Vec<u16> = required_rules().iter().map(|r| r.port).collect();
        assert_eq!(ports, REQUIRED_PORTS);
    }
}
