//! Permission maps for information flow analysis.
//!
//! A permission map assigns every (class, permission) pair a flow
//! direction and a weight. Information flow analysis uses the map to turn
//! `allow` rules into weighted read/write edges.
//!
//! # File Format
//!
//! ```text
//! # comment
//! 2                          <- number of classes
//! class file 2               <- class name and permission count
//!     read      r   10       <- permission, direction, weight
//!     write     w   10
//! class process 1
//!     transition w 5
//! ```
//!
//! Directions are `r` (read), `w` (write), `b` (both), `n` (none) and
//! `u` (unmapped). Weights range from 1 to 10. Loading is atomic: a parse
//! error leaves no partially populated map behind.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PolicyError, Result};
use crate::policy::{Policy, TeRule, TeRuletype};

/// Lowest permission weight.
pub const MIN_WEIGHT: u8 = 1;
/// Highest permission weight.
pub const MAX_WEIGHT: u8 = 10;
/// Location of the system permission map.
pub const DEFAULT_PATH: &str = "/usr/share/setools/perm_map";

// =============================================================================
// MAPPINGS
// =============================================================================

/// Information flow direction of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowDirection {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "b")]
    Both,
    #[serde(rename = "n")]
    None,
    #[serde(rename = "u")]
    Unmapped,
}

impl FlowDirection {
    pub fn as_char(self) -> char {
        match self {
            FlowDirection::Read => 'r',
            FlowDirection::Write => 'w',
            FlowDirection::Both => 'b',
            FlowDirection::None => 'n',
            FlowDirection::Unmapped => 'u',
        }
    }

    pub fn is_read(self) -> bool {
        matches!(self, FlowDirection::Read | FlowDirection::Both)
    }

    pub fn is_write(self) -> bool {
        matches!(self, FlowDirection::Write | FlowDirection::Both)
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for FlowDirection {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(FlowDirection::Read),
            "w" => Ok(FlowDirection::Write),
            "b" => Ok(FlowDirection::Both),
            "n" => Ok(FlowDirection::None),
            "u" => Ok(FlowDirection::Unmapped),
            _ => Err(PolicyError::InvalidValue(format!(
                "Invalid information flow direction: {}",
                s
            ))),
        }
    }
}

/// Mapping of a single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub direction: FlowDirection,
    pub weight: u8,
    pub enabled: bool,
}

impl Mapping {
    pub fn new(direction: FlowDirection, weight: u8) -> Self {
        Self {
            direction,
            weight,
            enabled: true,
        }
    }

    /// Entry created for permissions missing from the map.
    pub fn unmapped() -> Self {
        Self::new(FlowDirection::Unmapped, MIN_WEIGHT)
    }
}

/// Read and write weight of a rule; 0 means no flow in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleWeight {
    pub read: u8,
    pub write: u8,
}

fn validate_weight(weight: u8) -> Result<u8> {
    if (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(weight)
    } else {
        Err(PolicyError::InvalidValue(format!(
            "Permission weights must be {}-{}: {}",
            MIN_WEIGHT, MAX_WEIGHT, weight
        )))
    }
}

// =============================================================================
// PERMISSION MAP
// =============================================================================

/// Class -> permission -> mapping, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMap {
    classes: BTreeMap<String, BTreeMap<String, Mapping>>,
}

impl PermissionMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a permission map file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening permission map \"{}\"", path.display());
        let text = fs::read_to_string(path).map_err(|e| PolicyError::io_with_path(e, path))?;
        let map = Self::parse(&text, path)?;
        info!(
            "Successfully opened permission map \"{}\" ({} classes)",
            path.display(),
            map.classes.len()
        );
        Ok(map)
    }

    /// Parse permission map text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        enum State {
            ClassCount,
            ClassDecl,
            Perms { class: String, remaining: usize },
        }

        let mut classes: BTreeMap<String, BTreeMap<String, Mapping>> = BTreeMap::new();
        let mut state = State::ClassCount;
        let mut total_classes = 0usize;
        let mut class_count = 0usize;

        for (index, raw) in text.lines().enumerate() {
            let line_num = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |msg: String| PolicyError::map_parse(origin, line_num, msg);
            let fields: Vec<&str> = line.split_whitespace().collect();

            state = match state {
                State::ClassCount => {
                    total_classes = match fields.as_slice() {
                        [count] => count.parse::<usize>().ok().filter(|n| *n > 0),
                        _ => None,
                    }
                    .ok_or_else(|| err(format!("Invalid number of classes: {}", line)))?;
                    debug!("Permission map has {} classes.", total_classes);
                    State::ClassDecl
                }
                State::ClassDecl => {
                    let [keyword, name, count] = fields.as_slice() else {
                        return Err(err(format!("Invalid class declaration: {}", line)));
                    };
                    if *keyword != "class" {
                        return Err(err(format!("Invalid class declaration: {}", line)));
                    }
                    if !name.is_ascii() {
                        return Err(err(format!("Non-ASCII class name: {}", name)));
                    }
                    let remaining = count
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| err(format!("Number of permissions must be positive: {}", count)))?;

                    class_count += 1;
                    if class_count > total_classes {
                        return Err(err(format!("Extra class found: {}", name)));
                    }
                    if classes.contains_key(*name) {
                        warn!("{}:{}: duplicate class {}, merging permissions", origin.display(), line_num, name);
                    }
                    classes.entry(name.to_string()).or_default();
                    debug!("Now on class {} ({} permissions)", name, remaining);
                    State::Perms {
                        class: name.to_string(),
                        remaining,
                    }
                }
                State::Perms { class, remaining } => {
                    let [perm, dir, weight] = fields.as_slice() else {
                        return Err(err(format!("Invalid permission map entry: {}", line)));
                    };
                    if !perm.is_ascii() {
                        return Err(err(format!("Non-ASCII permission name: {}", perm)));
                    }
                    let direction: FlowDirection = dir
                        .parse()
                        .map_err(|_| err(format!("Invalid information flow direction: {}", dir)))?;
                    let weight = weight
                        .parse::<u8>()
                        .ok()
                        .and_then(|w| validate_weight(w).ok())
                        .ok_or_else(|| {
                            err(format!(
                                "Permission weight must be {}-{}: {}",
                                MIN_WEIGHT, MAX_WEIGHT, weight
                            ))
                        })?;

                    let perms = classes.entry(class.clone()).or_default();
                    if perms
                        .insert(perm.to_string(), Mapping::new(direction, weight))
                        .is_some()
                    {
                        warn!("{}:{}: duplicate permission {}:{}", origin.display(), line_num, class, perm);
                    }

                    if remaining == 1 {
                        State::ClassDecl
                    } else {
                        State::Perms {
                            class,
                            remaining: remaining - 1,
                        }
                    }
                }
            };
        }

        let eof = |msg: String| PolicyError::map_parse(origin, text.lines().count(), msg);
        match state {
            State::ClassCount => Err(eof("Permission map is empty".to_string())),
            State::Perms { class, remaining } => Err(eof(format!(
                "Missing {} permissions for class {}",
                remaining, class
            ))),
            State::ClassDecl if class_count < total_classes => Err(eof(format!(
                "Only {} of {} classes found",
                class_count, total_classes
            ))),
            State::ClassDecl => Ok(Self { classes }),
        }
    }

    /// Write the map in file format, classes and permissions sorted by name.
    ///
    /// Enabled/disabled state is not part of the file format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io_err = |e| PolicyError::io_with_path(e, path);
        let file = fs::File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);

        writeln!(out, "# auto-generated by seflow\n").map_err(io_err)?;
        writeln!(out, "{}", self.classes.len()).map_err(io_err)?;
        for (class, perms) in &self.classes {
            writeln!(out, "\nclass {} {}", class, perms.len()).map_err(io_err)?;
            for (perm, mapping) in perms {
                writeln!(
                    out,
                    "{:>20} {:>9} {:>9}",
                    perm, mapping.direction, mapping.weight
                )
                .map_err(io_err)?;
            }
        }
        out.flush().map_err(io_err)?;
        info!("Successfully wrote permission map to \"{}\"", path.display());
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn classes(&self) -> impl Iterator<Item = &str> + '_ {
        self.classes.keys().map(String::as_str)
    }

    /// Permission mappings of a class.
    pub fn perms(&self, class: &str) -> Result<impl Iterator<Item = (&str, &Mapping)> + '_> {
        let perms = self
            .classes
            .get(class)
            .ok_or_else(|| PolicyError::UnmappedClass(class.to_string()))?;
        Ok(perms.iter().map(|(p, m)| (p.as_str(), m)))
    }

    pub fn mapping(&self, class: &str, perm: &str) -> Result<&Mapping> {
        self.classes
            .get(class)
            .ok_or_else(|| PolicyError::UnmappedClass(class.to_string()))?
            .get(perm)
            .ok_or_else(|| PolicyError::UnmappedPermission {
                class: class.to_string(),
                perm: perm.to_string(),
            })
    }

    fn mapping_mut(&mut self, class: &str, perm: &str) -> Result<&mut Mapping> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| PolicyError::UnmappedClass(class.to_string()))?
            .get_mut(perm)
            .ok_or_else(|| PolicyError::UnmappedPermission {
                class: class.to_string(),
                perm: perm.to_string(),
            })
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    fn set_class_enabled(&mut self, class: &str, enabled: bool) -> Result<()> {
        let perms = self
            .classes
            .get_mut(class)
            .ok_or_else(|| PolicyError::UnmappedClass(class.to_string()))?;
        for mapping in perms.values_mut() {
            mapping.enabled = enabled;
        }
        Ok(())
    }

    /// Enable every permission of a class.
    pub fn include_class(&mut self, class: &str) -> Result<()> {
        self.set_class_enabled(class, true)
    }

    /// Disable every permission of a class.
    pub fn exclude_class(&mut self, class: &str) -> Result<()> {
        self.set_class_enabled(class, false)
    }

    pub fn include_permission(&mut self, class: &str, perm: &str) -> Result<()> {
        self.mapping_mut(class, perm)?.enabled = true;
        Ok(())
    }

    pub fn exclude_permission(&mut self, class: &str, perm: &str) -> Result<()> {
        self.mapping_mut(class, perm)?.enabled = false;
        Ok(())
    }

    pub fn set_direction(&mut self, class: &str, perm: &str, direction: FlowDirection) -> Result<()> {
        self.mapping_mut(class, perm)?.direction = direction;
        Ok(())
    }

    /// Fails with `InvalidValue` unless `weight` is 1-10.
    pub fn set_weight(&mut self, class: &str, perm: &str, weight: u8) -> Result<()> {
        let weight = validate_weight(weight)?;
        self.mapping_mut(class, perm)?.weight = weight;
        Ok(())
    }

    /// Add unmapped entries for every class and permission (including
    /// inherited common permissions) of the policy missing from the map.
    pub fn map_policy(&mut self, policy: &Policy) {
        for class in policy.classes() {
            if !self.classes.contains_key(&class.name) {
                warn!("Adding unmapped class {} from {}", class.name, policy);
            }
            let perms = self.classes.entry(class.name.clone()).or_default();

            for perm in class.all_perms(policy) {
                if !perms.contains_key(&perm) {
                    warn!("Adding unmapped permission {} in {} from {}", perm, class.name, policy);
                    perms.insert(perm, Mapping::unmapped());
                }
            }
        }
    }

    /// Read and write weight of an allow rule: the largest weight among its
    /// enabled permissions in each direction.
    pub fn rule_weight(&self, policy: &Policy, rule: &TeRule) -> Result<RuleWeight> {
        if rule.ruletype != TeRuletype::Allow {
            return Err(PolicyError::RuleType(rule.ruletype.to_string()));
        }

        let class = &policy.class(rule.tclass).name;
        let perms = self
            .classes
            .get(class)
            .ok_or_else(|| PolicyError::UnmappedClass(class.clone()))?;

        let mut weight = RuleWeight::default();
        for perm in rule.perms()? {
            let mapping = perms
                .get(perm)
                .ok_or_else(|| PolicyError::UnmappedPermission {
                    class: class.clone(),
                    perm: perm.clone(),
                })?;
            if !mapping.enabled {
                continue;
            }
            if mapping.direction.is_read() {
                weight.read = weight.read.max(mapping.weight);
            }
            if mapping.direction.is_write() {
                weight.write = weight.write.max(mapping.weight);
            }
        }
        Ok(weight)
    }
}
