//! Well-known port names and guidance used in finding messages

/// Human-readable service name for a well-known port
pub fn port_name(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        135 => "NetBIOS/RPC",
        139 => "NetBIOS/SMB",
        143 => "IMAP",
        443 => "HTTPS",
        445 => "SMB",
        993 => "IMAPS",
        995 => "POP3S",
        1433 => "MSSQL",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        6379 => "Redis",
        27017 => "MongoDB",
        _ => return None,
    };
    Some(name)
}

/// "23 (Telnet)" for well-known ports, "8080" otherwise
pub fn describe_port(port: u16) -> String {
    match port_name(port) {
        Some(name) => format!("{} ({})", port, name),
        None => port.to_string(),
    }
}

/// Ports used for interactive remote access
pub fn is_remote_access(port: u16) -> bool {
    matches!(port, 22 | 3389)
}

/// Why a blocked port is blocked and what to use instead
pub fn blocked_port_guidance(port: u16) -> (&'static str, &'static str) {
    match port {
        135 | 139 => (
            "commonly exploited for lateral movement and not needed for cloud workloads",
            "Remove this rule. If you need Windows RPC, contact the security team.",
        ),
        23 => (
            "transmits data in plain text and is easily intercepted",
            "Use SSH or AWS Systems Manager Session Manager instead.",
        ),
        3389 => (
            "commonly brute-forced and exploited",
            "Use AWS Systems Manager Session Manager for Windows access.",
        ),
        21 | 25 => (
            "an insecure protocol that transmits credentials in plain text",
            "Use a secure alternative (SFTP, encrypted mail submission).",
        ),
        _ => (
            "blocked by the guardrail policy",
            "Remove this rule or contact the security team if it is required.",
        ),
    }
}

/// Advisory text for a warning port
pub fn warning_port_guidance(port: u16) -> &'static str {
    if is_remote_access(port) {
        "Prefer AWS Systems Manager Session Manager or a bastion host over direct remote access."
    } else if matches!(port, 1433 | 3306 | 5432 | 6379 | 27017) {
        "Database access is a common audit finding; prefer security group references over CIDR sources."
    } else {
        "This port is allowed but flagged for review by the guardrail policy."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_known_and_unknown_ports() {
        assert_eq!(describe_port(23), "23 (Telnet)");
        assert_eq!(describe_port(3389), "3389 (RDP)");
        assert_eq!(describe_port(8080), "8080");
    }

    #[test]
    fn remote_access_guidance_mentions_session_manager() {
        assert!(warning_port_guidance(22).contains("Session Manager"));
        assert!(warning_port_guidance(3389).contains("bastion"));
        assert!(!warning_port_guidance(5432).contains("bastion"));
    }
}
