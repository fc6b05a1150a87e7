//! Camera parameter definitions and the update path to the hardware.
//!
//! The definition file has one parameter per line:
//!
//! ```text
//! # exposed name      kind    camera node
//! exposure_auto       enum    ExposureAuto
//! exposure_time       float   ExposureTime
//! "frame rate"        float   AcquisitionFrameRate
//! ```
//!
//! Tokens are separated by whitespace and may be double quoted. Blank lines
//! and lines whose first token starts with `#` are skipped; lines with the
//! wrong number of tokens or an unknown kind are logged and skipped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::capture::Driver;
use crate::error::ParamError;
use crate::params::{verify, ParamKind, ParamValue, ParameterStore};

/// One line of the definition file
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Name the parameter is exposed under
    pub name: String,
    pub kind: ParamKind,
    /// Camera register the parameter writes to
    pub node: String,
}

/// Answer to a batch of parameter updates
#[derive(Debug, Clone, PartialEq)]
pub struct SetParametersResult {
    pub successful: bool,
    pub reason: String,
}

/// Name-indexed table of camera parameters, in file order
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    order: Vec<String>,
    descriptors: HashMap<String, ParameterDescriptor>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a definition file. Only an unreadable file is an error.
    #[instrument]
    pub fn load(path: &Path) -> Result<Self, ParamError> {
        let text = fs::read_to_string(path).map_err(|source| ParamError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::parse(&text);
        info!(
            "loaded {} camera parameters from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn parse(text: &str) -> Self {
        let mut registry = Self::new();
        for line in text.lines() {
            match parse_line(line) {
                Ok(Some(desc)) => registry.insert(desc),
                Ok(None) => {}
                Err(e) => warn!("skipping bad camera param line: {} ({})", line, e),
            }
        }
        registry
    }

    /// Add a descriptor. A later definition of the same name replaces the
    /// earlier one but keeps its position.
    pub fn insert(&mut self, desc: ParameterDescriptor) {
        if self.descriptors.contains_key(&desc.name) {
            warn!("parameter {} defined twice, keeping the last definition", desc.name);
        } else {
            self.order.push(desc.name.clone());
        }
        self.descriptors.insert(desc.name.clone(), desc);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.descriptors.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descriptors in file order
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.order.iter().filter_map(|name| self.descriptors.get(name))
    }

    /// Declare every parameter on `store`, in file order.
    ///
    /// A declaration rejected for a stale type is retried once with
    /// overwrite. Returns the initial values that need to go to the camera.
    pub fn create(&self, store: &ParameterStore) -> Vec<(String, ParamValue)> {
        let mut initial = Vec::new();
        for desc in self.iter() {
            let declared = match store.declare(desc, false) {
                Ok(v) => Ok(v),
                Err(e @ ParamError::TypeMismatch { .. }) => {
                    warn!("overwriting bad param with default: {}", e);
                    store.declare(desc, true)
                }
                Err(e) => Err(e),
            };
            match declared {
                Ok(Some(value)) => initial.push((desc.name.clone(), value)),
                Ok(None) => {}
                Err(e) => warn!("cannot declare {}: {}", desc.name, e),
            }
        }
        initial
    }

    /// Forward one update to the camera. Returns true when the camera
    /// reports back the requested value.
    ///
    /// Never fails: kind mismatches, rejected writes and driver errors are
    /// logged and the update is dropped.
    pub fn apply(&self, driver: &dyn Driver, name: &str, value: &ParamValue) -> bool {
        let Some(desc) = self.descriptors.get(name) else {
            debug!("ignoring unknown parameter {}", name);
            return false;
        };
        let Some(coerced) = desc.kind.coerce(value) else {
            warn!(
                "bad non-{} {} type: {}",
                desc.kind,
                name,
                value.type_name()
            );
            return false;
        };
        match verify::set_value(driver, &desc.node, &coerced) {
            Ok(ok) => ok,
            Err(e) => {
                warn!("param {} {}", name, e);
                false
            }
        }
    }

    /// Handle a batch of updates from the host. Always succeeds; failed
    /// writes only produce warnings.
    pub fn on_parameters_changed(
        &self,
        driver: Option<&dyn Driver>,
        updates: &[(String, ParamValue)],
    ) -> SetParametersResult {
        for (name, value) in updates {
            if !self.descriptors.contains_key(name) {
                continue;
            }
            let Some(driver) = driver else {
                warn!("got parameter update while driver is not ready!");
                continue;
            };
            self.apply(driver, name, value);
        }
        SetParametersResult {
            successful: true,
            reason: "all good!".to_string(),
        }
    }
}

fn parse_line(line: &str) -> Result<Option<ParameterDescriptor>, ParamError> {
    let tokens = tokenize(line)?;
    match tokens.first() {
        None => return Ok(None),
        Some(first) if first.starts_with('#') => return Ok(None),
        Some(_) => {}
    }
    if tokens.len() != 3 {
        return Err(ParamError::BadLine {
            line: line.to_string(),
            found: tokens.len(),
        });
    }
    let mut tokens = tokens.into_iter();
    let (Some(name), Some(kind), Some(node)) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Ok(None);
    };
    Ok(Some(ParameterDescriptor {
        name,
        kind: kind.parse()?,
        node,
    }))
}

/// Split a line into whitespace separated tokens. A token starting with a
/// double quote runs to the closing quote; `\"` and `\\` escape inside it.
fn tokenize(line: &str) -> Result<Vec<String>, ParamError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&c) = chars.peek() else { break };

        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => token.push(c),
                }
            }
            if !closed {
                return Err(ParamError::UnterminatedQuote(line.to_string()));
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                token.push(c);
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}
