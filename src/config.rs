//! TOML analysis configuration.
//!
//! ```toml
//! perm_map = "/usr/share/setools/perm_map"
//!
//! [infoflow]
//! min_weight = 3
//! exclude = ["unconfined_t"]
//!
//! [dta]
//! reverse = false
//!
//! [checks.no_exec_write]
//! check_type = "ro_execs"
//! exempt_write_domain = "installer_t"
//! ```
//!
//! Parsing only checks the document shape. Weights, type names and check
//! options are validated when applied to a policy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checker::{create_check, CheckConfig, CheckerModule};
use crate::dta::DomainTransitionAnalysis;
use crate::error::{PolicyError, Result};
use crate::infoflow::InfoFlowAnalysis;
use crate::permmap::PermissionMap;
use crate::policy::Policy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Permission map file; the analysis falls back to an empty map.
    pub perm_map: Option<PathBuf>,
    pub infoflow: InfoFlowSettings,
    pub dta: DtaSettings,
    /// Check name to option table.
    pub checks: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfoFlowSettings {
    /// Unset keeps the analysis default. Range checked on apply.
    pub min_weight: Option<i64>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DtaSettings {
    pub reverse: bool,
    pub exclude: Vec<String>,
}

impl AnalysisConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PolicyError::Config(format!("Invalid TOML: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PolicyError::io_with_path(e, path))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded analysis configuration from {}", path.display());
        Ok(config)
    }

    /// The configured permission map, or an empty map when none is set.
    pub fn load_perm_map(&self) -> Result<PermissionMap> {
        match &self.perm_map {
            Some(path) => PermissionMap::load(path),
            None => Ok(PermissionMap::new()),
        }
    }

    /// Option map of one check, with TOML scalars and string arrays flattened
    /// to the string form the checker modules parse.
    pub fn check_config(&self, name: &str) -> Result<CheckConfig> {
        let table = self
            .checks
            .get(name)
            .ok_or_else(|| PolicyError::Config(format!("No check named {}", name)))?;
        table
            .iter()
            .map(|(option, value)| Ok((option.clone(), option_string(name, option, value)?)))
            .collect()
    }

    /// Instantiate every configured check, in name order.
    pub fn create_checks<'p>(&self, policy: &'p Policy) -> Result<Vec<Box<dyn CheckerModule + 'p>>> {
        self.checks
            .keys()
            .map(|name| {
                let config = self.check_config(name)?;
                create_check(policy, name, &config)
            })
            .collect()
    }
}

fn option_string(check: &str, option: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.as_str()),
                _ => Err(invalid_option(check, option)),
            })
            .collect::<Result<Vec<_>>>()
            .map(|items| items.join(" ")),
        _ => Err(invalid_option(check, option)),
    }
}

fn invalid_option(check: &str, option: &str) -> PolicyError {
    PolicyError::InvalidCheckValue {
        check: check.to_string(),
        option: option.to_string(),
        message: "expected a string, boolean, integer or string array".to_string(),
    }
}

impl InfoFlowSettings {
    pub fn apply(&self, analysis: &mut InfoFlowAnalysis<'_>) -> Result<()> {
        if let Some(weight) = self.min_weight {
            let weight = u8::try_from(weight).map_err(|_| {
                PolicyError::InvalidValue(format!(
                    "Min information flow weight must be an integer 1-10: {}",
                    weight
                ))
            })?;
            analysis.set_min_weight(weight)?;
        }
        analysis.set_exclude(&self.exclude)?;
        debug!("Applied infoflow settings: {:?}", self);
        Ok(())
    }
}

impl DtaSettings {
    pub fn apply(&self, analysis: &mut DomainTransitionAnalysis<'_>) -> Result<()> {
        analysis.set_reverse(self.reverse);
        analysis.set_exclude(&self.exclude)?;
        debug!("Applied DTA settings: {:?}", self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    const CONFIG: &str = r#"
[infoflow]
min_weight = 5
exclude = ["b_t"]

[dta]
reverse = true

[checks.empty]
check_type = "empty_typeattr"
attr = "empty_attr"
missing_ok = true

[checks.execs]
check_type = "ro_execs"
exempt_write_domain = ["a_t", "b_t"]
"#;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("config");
        b.class("file", &["read", "write", "execute"], None).unwrap();
        b.attribute("empty_attr").unwrap();
        b.type_("a_t", &[]).unwrap();
        b.type_("b_t", &[]).unwrap();
        b.build()
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_from_toml() {
        let config = AnalysisConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.perm_map, None);
        assert_eq!(config.infoflow.min_weight, Some(5));
        assert_eq!(config.infoflow.exclude, vec!["b_t".to_string()]);
        assert!(config.dta.reverse);
        assert!(config.dta.exclude.is_empty());
        assert_eq!(config.checks.len(), 2);

        let execs = config.check_config("execs").unwrap();
        assert_eq!(execs["exempt_write_domain"], "a_t b_t");
        let empty = config.check_config("empty").unwrap();
        assert_eq!(empty["missing_ok"], "true");
    }

    #[test]
    fn test_from_toml_empty_and_invalid() {
        assert_eq!(AnalysisConfig::from_toml("").unwrap(), AnalysisConfig::default());
        assert!(matches!(
            AnalysisConfig::from_toml("[infoflow\nmin_weight = 3"),
            Err(PolicyError::Config(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("bogus = 1"),
            Err(PolicyError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));

        let path = dir.path().join("seflow.toml");
        fs::write(&path, CONFIG).unwrap();
        assert_eq!(AnalysisConfig::load(&path).unwrap().checks.len(), 2);
    }

    // =========================================================================
    // Application
    // =========================================================================

    #[test]
    fn test_apply_settings() {
        let p = policy();
        let config = AnalysisConfig::from_toml(CONFIG).unwrap();

        let mut ifa = InfoFlowAnalysis::new(&p, config.load_perm_map().unwrap());
        config.infoflow.apply(&mut ifa).unwrap();
        assert_eq!(ifa.min_weight(), 5);
        assert_eq!(ifa.exclude().len(), 1);

        let mut dta = DomainTransitionAnalysis::new(&p);
        config.dta.apply(&mut dta).unwrap();
        assert!(dta.reverse());

        let bad = InfoFlowSettings {
            min_weight: Some(11),
            exclude: Vec::new(),
        };
        assert!(matches!(bad.apply(&mut ifa), Err(PolicyError::InvalidValue(_))));
    }

    #[test]
    fn test_out_of_range_weight_from_toml() {
        let p = policy();
        let mut ifa = InfoFlowAnalysis::new(&p, PermissionMap::new());
        for text in ["[infoflow]\nmin_weight = 300\n", "[infoflow]\nmin_weight = -1\n"] {
            let config = AnalysisConfig::from_toml(text).unwrap();
            assert!(matches!(
                config.infoflow.apply(&mut ifa),
                Err(PolicyError::InvalidValue(_))
            ));
        }
        assert_eq!(ifa.min_weight(), 1);
    }

    #[test]
    fn test_create_checks() {
        let p = policy();
        let config = AnalysisConfig::from_toml(CONFIG).unwrap();
        let checks = config.create_checks(&p).unwrap();
        let names: Vec<&str> = checks.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["empty", "execs"]);
        assert!(checks.iter().all(|c| c.run().is_empty()));

        assert!(matches!(
            config.check_config("absent"),
            Err(PolicyError::Config(_))
        ));
    }
}
