use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{AttrId, Policy};

use super::options::{self, invalid_value};
use super::{CheckBase, CheckConfig, CheckerModule, Finding};

pub(super) const EMPTY_TYPEATTR: &str = "empty_typeattr";

const ATTR_OPT: &str = "attr";
const MISSING_OK_OPT: &str = "missing_ok";

pub(super) const OPTIONS: &[&str] = &[ATTR_OPT, MISSING_OK_OPT];

/// Fails for every type that carries the attribute.
///
/// With `missing_ok`, an attribute absent from the policy passes instead of
/// being a configuration error.
#[derive(Debug, Clone)]
pub struct EmptyTypeAttr<'p> {
    policy: &'p Policy,
    base: CheckBase,
    attr: Option<AttrId>,
}

impl<'p> EmptyTypeAttr<'p> {
    pub fn new(policy: &'p Policy, base: CheckBase, config: &CheckConfig) -> Result<Self> {
        let missing_ok = options::bool_value(options::get(config, MISSING_OK_OPT));
        let name = options::get(config, ATTR_OPT)
            .ok_or_else(|| invalid_value(&base.name, ATTR_OPT, "A type attribute must be specified."))?;

        let attr = match policy.lookup_typeattr(name) {
            Ok(attr) => Some(attr.id),
            Err(_) if missing_ok => {
                info!("{}: attribute {} is missing; check passes", base.name, name);
                None
            }
            Err(e) => return Err(invalid_value(&base.name, ATTR_OPT, e)),
        };

        Ok(Self { policy, base, attr })
    }
}

impl CheckerModule for EmptyTypeAttr<'_> {
    fn check_type(&self) -> &'static str {
        EMPTY_TYPEATTR
    }

    fn base(&self) -> &CheckBase {
        &self.base
    }

    fn run(&self) -> Vec<Finding> {
        info!("Checking type attribute is empty.");
        let Some(attr) = self.attr else {
            debug!("Attribute not in policy");
            return Vec::new();
        };

        let mut failures: Vec<Finding> = self
            .policy
            .attribute(attr)
            .types
            .iter()
            .map(|t| {
                let name = self.policy.type_(*t).name.clone();
                info!("F   * {}", name);
                Finding::Type(name)
            })
            .collect();
        failures.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        debug!("{} failure(s)", failures.len());
        failures
    }
}

pub(super) fn build<'p>(
    policy: &'p Policy,
    base: CheckBase,
    config: &CheckConfig,
) -> Result<Box<dyn CheckerModule + 'p>> {
    Ok(Box::new(EmptyTypeAttr::new(policy, base, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::create_check;
    use crate::error::PolicyError;
    use crate::policy::PolicyBuilder;

    fn config(pairs: &[(&str, &str)]) -> CheckConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("emptyattr");
        b.attribute("unconfined").unwrap();
        b.attribute("empty").unwrap();
        b.type_("zed_t", &["unconfined"]).unwrap();
        b.type_("alpha_t", &["unconfined"]).unwrap();
        b.build()
    }

    #[test]
    fn test_members_fail() {
        let p = policy();
        let check = create_check(
            &p,
            "no_unconfined",
            &config(&[("check_type", "empty_typeattr"), ("attr", "unconfined")]),
        )
        .unwrap();
        assert_eq!(
            check.run(),
            vec![
                Finding::Type("alpha_t".to_string()),
                Finding::Type("zed_t".to_string())
            ]
        );

        let check = create_check(
            &p,
            "empty",
            &config(&[("check_type", "empty_typeattr"), ("attr", "empty")]),
        )
        .unwrap();
        assert!(check.run().is_empty());
    }

    #[test]
    fn test_missing_attribute() {
        let p = policy();
        let err = create_check(
            &p,
            "missing",
            &config(&[("check_type", "empty_typeattr"), ("attr", "gone")]),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidCheckValue { .. }));

        let check = create_check(
            &p,
            "missing",
            &config(&[
                ("check_type", "empty_typeattr"),
                ("attr", "gone"),
                ("missing_ok", "Yes"),
            ]),
        )
        .unwrap();
        assert!(check.run().is_empty());

        let err = create_check(&p, "noattr", &config(&[("check_type", "empty_typeattr")])).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidCheckValue { .. }));
    }
}
