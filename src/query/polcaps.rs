use tracing::info;

use crate::error::Result;
use crate::policy::Policy;

use super::matching::Criterion;

/// Query policy capabilities by name.
#[derive(Debug, Clone)]
pub struct PolcapQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<String>>,
}

impl<'p> PolcapQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self { policy, name: None }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_polcap(name)?.to_string()));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p str> + '_ {
        info!("Generating policy capability results from {}", self.policy);
        self.policy.polcaps().filter(move |cap| match &self.name {
            None => true,
            Some(Criterion::Exact(name)) => name == cap,
            Some(Criterion::Regex(r)) => r.is_match(cap),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::policy::PolicyBuilder;

    #[test]
    fn test_polcap_names() {
        let mut b = PolicyBuilder::new("polcaps");
        b.polcap("network_peer_controls").unwrap();
        b.polcap("open_perms").unwrap();
        let p = b.build();

        let q = PolcapQuery::new(&p).with_name_regex("^open").unwrap();
        assert_eq!(q.results().collect::<Vec<_>>(), vec!["open_perms"]);

        assert_eq!(PolcapQuery::new(&p).results().count(), 2);
        assert!(matches!(
            PolcapQuery::new(&p).with_name("extended_socket_class"),
            Err(PolicyError::InvalidPolicyCapability(_))
        ));
    }
}
