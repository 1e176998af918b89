//! Run configuration.
//!
//! Two layers: [`ConfigFile`] is a plain `name = value` file with typed
//! getters and file-pattern expansion, and [`RunConfig`] is the
//! strongly-typed structure the driver actually consumes, built once from
//! a `ConfigFile` so every toggle and path list is resolved up front.

use crate::display::WaitPolicy;
use crate::sequence::InputFormat;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(String),

    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    #[error("line {line}: parameter {name} defined twice")]
    Duplicate { name: String, line: usize },

    #[error("missing parameter {0}")]
    Missing(String),

    #[error("parameter {name} is not a valid {expected}: {value:?}")]
    WrongType {
        name: String,
        expected: &'static str,
        value: String,
    },

    #[error("parameter {name}: bad file pattern {pattern:?}")]
    BadPattern { name: String, pattern: String },
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

/// Parsed `name = value` file.
///
/// `#` starts a comment, blank lines are skipped, names are made of
/// ASCII letters, digits and underscores, and defining a name twice is
/// an error.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (name, value) = trimmed.split_once('=').ok_or_else(|| {
                ConfigError::Syntax {
                    line,
                    msg: "expected name = value".to_string(),
                }
            })?;
            let name = name.trim();
            if name.is_empty()
                || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ConfigError::Syntax {
                    line,
                    msg: format!("invalid parameter name {name:?}"),
                });
            }
            if values
                .insert(name.to_string(), value.trim().to_string())
                .is_some()
            {
                return Err(ConfigError::Duplicate {
                    name: name.to_string(),
                    line,
                });
            }
        }
        Ok(Self { values })
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn raw(&self, name: &str) -> Result<&str, ConfigError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::Missing(name.to_string()))
    }

    fn wrong_type(&self, name: &str, expected: &'static str, value: &str) -> ConfigError {
        ConfigError::WrongType {
            name: name.to_string(),
            expected,
            value: value.to_string(),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ConfigError> {
        let v = self.raw(name)?;
        v.parse().map_err(|_| self.wrong_type(name, "integer", v))
    }

    pub fn float(&self, name: &str) -> Result<f64, ConfigError> {
        let v = self.raw(name)?;
        v.parse().map_err(|_| self.wrong_type(name, "float", v))
    }

    /// Boolean values are spelled `True` and `False`.
    pub fn bool(&self, name: &str) -> Result<bool, ConfigError> {
        match self.raw(name)? {
            "True" => Ok(true),
            "False" => Ok(false),
            v => Err(self.wrong_type(name, "boolean", v)),
        }
    }

    /// String value, unquoting and unescaping if quoted.
    pub fn string(&self, name: &str) -> Result<String, ConfigError> {
        let v = self.raw(name)?;
        if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
            unescape(&v[1..v.len() - 1])
                .ok_or_else(|| self.wrong_type(name, "quoted string", v))
        } else {
            Ok(v.to_string())
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, ConfigError> {
        if self.has(name) {
            self.int(name)
        } else {
            Ok(default)
        }
    }

    pub fn float_or(&self, name: &str, default: f64) -> Result<f64, ConfigError> {
        if self.has(name) {
            self.float(name)
        } else {
            Ok(default)
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        if self.has(name) {
            self.bool(name)
        } else {
            Ok(default)
        }
    }

    pub fn string_or(&self, name: &str, default: &str) -> Result<String, ConfigError> {
        if self.has(name) {
            self.string(name)
        } else {
            Ok(default.to_string())
        }
    }

    /// Expand a parameter into a list of file paths.
    ///
    /// Pattern forms, tried in order:
    /// - `@list.txt` reads one pattern per non-blank line of `list.txt`
    ///   and expands each;
    /// - `img<12>.fits` expands the `<N>` marker to 1..=N in place;
    /// - anything with `*`, `?` or `[` is a glob, matches sorted;
    /// - everything else is a single literal path.
    pub fn paths(&self, name: &str) -> Result<Vec<PathBuf>, ConfigError> {
        let pattern = self.string(name)?;
        self.expand(name, &pattern)
    }

    fn expand(&self, name: &str, pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
        if let Some(list_file) = pattern.strip_prefix('@') {
            let text = fs::read_to_string(list_file)?;
            let mut out = Vec::new();
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                out.extend(self.expand(name, line)?);
            }
            return Ok(out);
        }

        if let Some((prefix, rest)) = pattern.split_once('<') {
            let (count, suffix) = rest.split_once('>').ok_or_else(|| {
                ConfigError::BadPattern {
                    name: name.to_string(),
                    pattern: pattern.to_string(),
                }
            })?;
            let count: usize = count.parse().map_err(|_| ConfigError::BadPattern {
                name: name.to_string(),
                pattern: pattern.to_string(),
            })?;
            return Ok((1..=count)
                .map(|n| PathBuf::from(format!("{prefix}{n}{suffix}")))
                .collect());
        }

        if pattern.chars().any(|c| matches!(c, '*' | '?' | '[')) {
            let matches = glob::glob(pattern).map_err(|_| ConfigError::BadPattern {
                name: name.to_string(),
                pattern: pattern.to_string(),
            })?;
            let mut out = Vec::new();
            for entry in matches {
                out.push(entry.map_err(|e| ConfigError::Io(e.to_string()))?);
            }
            return Ok(out);
        }

        Ok(vec![PathBuf::from(pattern)])
    }
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Dark correction for one sequence role, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DarkCorrection {
    #[default]
    None,
    Single {
        paths: Vec<PathBuf>,
    },
    Bracketed {
        first: Vec<PathBuf>,
        second: Vec<PathBuf>,
    },
}

/// Flat-field correction as configured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlatConfig {
    pub paths: Vec<PathBuf>,
    /// Dark correction applied to the flat sequence itself.
    pub dark: DarkCorrection,
    /// Second flat sequence bracketing the run, for per-frame blending.
    pub second: Option<(Vec<PathBuf>, DarkCorrection)>,
}

/// Object to track and measure, with its starting position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectConfig {
    pub x: f32,
    pub y: f32,
    /// Fixed objects keep their position relative to the first one.
    pub movable: bool,
}

/// Everything one reduction-and-photometry run needs, resolved from a
/// [`ConfigFile`] up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_paths: Vec<PathBuf>,
    pub input_format: InputFormat,
    /// Dark correction for the data sequence.
    pub dark: DarkCorrection,
    pub flat: Option<FlatConfig>,
    pub show_frames: bool,
    /// Show every raw calibration frame while masters are built.
    pub show_calibration_source: bool,
    pub wait: WaitPolicy,
    pub objects: Vec<ObjectConfig>,
    /// Half-width of the tracker search box, in pixels.
    pub tolerance: usize,
    /// Aperture radii: signal, background inner, background outer.
    pub apertures: (f32, f32, f32),
    pub output_path: PathBuf,
}

impl RunConfig {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_file(&ConfigFile::open(path)?)
    }

    pub fn from_file(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        let data_paths = cfg.paths("Data")?;
        let format_str = cfg.string_or("InputFormat", "Auto")?;
        let input_format = format_str.parse().map_err(|_| ConfigError::WrongType {
            name: "InputFormat".to_string(),
            expected: "Auto, FITS or Video",
            value: format_str.clone(),
        })?;

        let dark = dark_correction(cfg, "")?;

        let flat = if cfg.bool_or("UseFlat", false)? {
            let second = if cfg.bool_or("UseFlat2", false)? {
                Some((cfg.paths("Flat2")?, dark_correction(cfg, "Flat2")?))
            } else {
                None
            };
            Some(FlatConfig {
                paths: cfg.paths("Flat")?,
                dark: dark_correction(cfg, "Flat")?,
                second,
            })
        } else {
            None
        };

        let count = cfg.int_or("Objects", 0)?;
        let mut objects = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            objects.push(ObjectConfig {
                x: cfg.float(&format!("Object{i}X"))? as f32,
                y: cfg.float(&format!("Object{i}Y"))? as f32,
                movable: cfg.bool_or(&format!("Object{i}Movable"), true)?,
            });
        }

        Ok(Self {
            data_paths,
            input_format,
            dark,
            flat,
            show_frames: cfg.bool_or("ShowFrames", false)?,
            show_calibration_source: cfg.bool_or("ShowCalibrationSource", false)?,
            wait: WaitPolicy::from_millis(cfg.int_or("WaitTime", 0)?),
            objects,
            tolerance: cfg.int_or("Tolerance", 10)?.max(0) as usize,
            apertures: (
                cfg.float_or("ApertureR1", 5.0)? as f32,
                cfg.float_or("ApertureR2", 8.0)? as f32,
                cfg.float_or("ApertureR3", 12.0)? as f32,
            ),
            output_path: PathBuf::from(cfg.string_or("Output", "results.txt")?),
        })
    }
}

/// Resolve the `Use<role>Dark` / `Use<role>Dark2` toggles for one role
/// ("", "Flat" or "Flat2") into a [`DarkCorrection`].
fn dark_correction(cfg: &ConfigFile, role: &str) -> Result<DarkCorrection, ConfigError> {
    if !cfg.bool_or(&format!("Use{role}Dark"), false)? {
        return Ok(DarkCorrection::None);
    }
    let first = cfg.paths(&format!("{role}Dark"))?;
    if cfg.bool_or(&format!("Use{role}Dark2"), false)? {
        Ok(DarkCorrection::Bracketed {
            first,
            second: cfg.paths(&format!("{role}Dark2"))?,
        })
    } else {
        Ok(DarkCorrection::Single { paths: first })
    }
}
