use crate::AuditError;

/// Trim, strip a trailing root dot, convert to ASCII (IDNA) and check labels.
pub fn normalize_domain(domain: &str) -> Result<String, AuditError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(AuditError::EmptyDomain);
    }
    let ascii = idna::domain_to_ascii(trimmed).map_err(AuditError::idna)?;

    let mut reasons = Vec::new();
    check_labels(&ascii, &mut reasons);
    if reasons.is_empty() {
        Ok(ascii)
    } else {
        Err(AuditError::invalid_domain(trimmed, reasons))
    }
}

fn check_labels(ascii: &str, reasons: &mut Vec<String>) {
    if ascii.is_empty() {
        reasons.push("domain empty after IDNA conversion".to_string());
        return;
    }
    if ascii.len() > 253 {
        reasons.push(format!("domain length {} > 253", ascii.len()));
    }
    if !ascii.contains('.') {
        reasons.push("domain must contain at least one dot".to_string());
    }

    for label in ascii.split('.') {
        if label.is_empty() {
            reasons.push("empty domain label".to_string());
            continue;
        }
        if label.len() > 63 {
            reasons.push(format!("domain label '{}' length {} > 63", label, label.len()));
        }
        if label.starts_with('-') || label.ends_with('-') {
            reasons.push(format!("domain label '{}' cannot start/end with '-'", label));
        }
        // underscores appear in service names such as _dmarc
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            reasons.push(format!("domain label '{}' has invalid chars", label));
        }
    }
}

/// Prefix `domain` with `label`, e.g. `fqdn("_dmarc", "example.com")`.
pub fn fqdn(label: &str, domain: &str) -> String {
    let trimmed = label.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        domain.to_string()
    } else {
        format!("{}.{}", trimmed.to_ascii_lowercase(), domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_domain_ok() {
        assert_eq!(normalize_domain("  Example.COM. ").unwrap(), "example.com");
    }

    #[test]
    fn unicode_domain_is_punycoded() {
        assert_eq!(normalize_domain("bücher.de").unwrap(), "xn--bcher-kva.de");
    }

    #[test]
    fn empty_domain_rejected() {
        assert!(matches!(normalize_domain("   "), Err(AuditError::EmptyDomain)));
    }

    #[test]
    fn label_too_long() {
        let long = "a".repeat(64);
        let err = normalize_domain(&format!("{}.com", long)).unwrap_err();
        match err {
            AuditError::InvalidDomain { reasons, .. } => {
                assert!(reasons.iter().any(|r| r.contains("> 63")), "{reasons:?}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn single_label_and_hyphen_edges_rejected() {
        assert!(matches!(
            normalize_domain("localhost"),
            Err(AuditError::InvalidDomain { .. })
        ));
        assert!(matches!(
            normalize_domain("-bad.example.com"),
            Err(AuditError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn fqdn_joins_labels() {
        assert_eq!(fqdn("_dmarc", "example.com"), "_dmarc.example.com");
        assert_eq!(fqdn("Selector1._domainkey", "example.com"), "selector1._domainkey.example.com");
        assert_eq!(fqdn(" ", "example.com"), "example.com");
    }
}
