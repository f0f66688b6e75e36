//! Recipient domain acceptance

/// Decides which recipient addresses this server takes mail for.
///
/// An address is accepted when it ends with `@` followed by one of the
/// configured domains. Nothing else about the address is checked: the local
/// part is not validated and no alias or sub-addressing rules apply.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    domains: Vec<String>,
    ignore_case: bool,
}

impl DomainPolicy {
    /// Create a policy accepting the given domains, compared case-sensitively
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            ignore_case: false,
        }
    }

    /// Compare the domain part ASCII case-insensitively
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn accepts(&self, address: &str) -> bool {
        self.domains
            .iter()
            .any(|domain| has_domain_suffix(address, domain, self.ignore_case))
    }
}

fn has_domain_suffix(address: &str, domain: &str, ignore_case: bool) -> bool {
    let address = address.as_bytes();
    let domain = domain.as_bytes();
    if address.len() <= domain.len() {
        return false;
    }

    let split = address.len() - domain.len();
    let tail = &address[split..];
    let matches = if ignore_case {
        tail.eq_ignore_ascii_case(domain)
    } else {
        tail == domain
    };

    matches && address[split - 1] == b'@'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DomainPolicy {
        DomainPolicy::new(["ghostpost.sh", "xn--9q8hgh.ws"])
    }

    #[test]
    fn test_accepts_configured_domains() {
        let policy = policy();
        assert!(policy.accepts("user@ghostpost.sh"));
        assert!(policy.accepts("someone.else+tag@xn--9q8hgh.ws"));
    }

    #[test]
    fn test_rejects_other_domains() {
        let policy = policy();
        assert!(!policy.accepts("user@example.com"));
        assert!(!policy.accepts("user@ghostpost.sh.evil.com"));
        assert!(!policy.accepts("ghostpost.sh"));
        assert!(!policy.accepts(""));
    }

    #[test]
    fn test_requires_at_sign_before_domain() {
        let policy = policy();
        assert!(!policy.accepts("user@notghostpost.sh"));
        assert!(!policy.accepts("user.ghostpost.sh"));
    }

    #[test]
    fn test_empty_local_part_is_not_validated() {
        assert!(policy().accepts("@ghostpost.sh"));
    }

    #[test]
    fn test_case_sensitive_by_default() {
        let policy = policy();
        assert!(!policy.accepts("user@GhostPost.sh"));
        assert!(policy.accepts("USER@ghostpost.sh"));
    }

    #[test]
    fn test_ignore_case() {
        let policy = policy().ignore_case(true);
        assert!(policy.accepts("user@GhostPost.SH"));
        assert!(!policy.accepts("user@GhostPost.SH.example"));
    }

    #[test]
    fn test_non_ascii_address() {
        let policy = policy();
        assert!(policy.accepts("tëst@ghostpost.sh"));
        assert!(!policy.accepts("tëst@exämple.com"));
    }

    #[test]
    fn test_domains_accessor() {
        assert_eq!(policy().domains(), ["ghostpost.sh", "xn--9q8hgh.ws"]);
    }
}
