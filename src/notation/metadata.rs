//! YAML front matter
//!
//! A notation string may start with a `---` block overriding
//! [`GlobalDefaults`] for that string only:
//!
//! ```text
//! ---
//! title: Etude
//! tempo: 96
//! time-signature: 3/4
//! swing: 0.3
//! voicing: drop2
//! ---
//! C4:q E4:q G4:q | [C]:h*
//! ```

use serde::Deserialize;

use super::types::{GlobalDefaults, Voicing};
use crate::error::NotationError;

/// Raw front matter for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawFrontMatter {
    pub title: Option<String>,
    #[serde(alias = "bpm")]
    pub tempo: Option<f64>,
    pub velocity: Option<f64>,
    pub articulation: Option<f64>,
    pub time_signature: Option<String>,
    pub swing: Option<f64>,
    pub reverb: Option<f64>,
    pub transpose: Option<i32>,
    pub key: Option<String>,
    pub program: Option<u8>,
    pub channel: Option<u8>,
    pub voicing: Option<Voicing>,
    pub chord_octave: Option<i32>,
}

/// Front matter after it has been folded into the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub defaults: GlobalDefaults,
}

fn unit_range(name: &str, value: f64) -> Result<f64, NotationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(NotationError::Metadata(format!(
            "{} must be within 0..1, got {}",
            name, value
        )))
    }
}

/// Apply a front matter block on top of `base`.
pub fn apply_front_matter(yaml: &str, base: &GlobalDefaults) -> Result<FrontMatter, NotationError> {
    let raw: RawFrontMatter = if yaml.trim().is_empty() {
        RawFrontMatter::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| NotationError::Metadata(e.to_string()))?
    };

    let mut defaults = base.clone();
    if let Some(tempo) = raw.tempo {
        defaults.bpm = tempo;
    }
    if let Some(velocity) = raw.velocity {
        defaults.velocity = unit_range("velocity", velocity)?;
    }
    if let Some(articulation) = raw.articulation {
        defaults.articulation = unit_range("articulation", articulation)?;
    }
    if let Some(ts) = raw.time_signature {
        defaults.time_signature = ts;
    }
    if let Some(swing) = raw.swing {
        defaults.swing = unit_range("swing", swing)?;
    }
    if let Some(reverb) = raw.reverb {
        defaults.reverb = unit_range("reverb", reverb)?;
    }
    if let Some(transpose) = raw.transpose {
        defaults.transpose = transpose;
    }
    if let Some(key) = raw.key {
        defaults.key = key;
    }
    if raw.program.is_some() {
        defaults.program = raw.program;
    }
    if let Some(channel) = raw.channel {
        defaults.channel = channel;
    }
    if let Some(voicing) = raw.voicing {
        defaults.voicing = voicing;
    }
    if let Some(octave) = raw.chord_octave {
        defaults.chord_octave = octave;
    }

    Ok(FrontMatter {
        title: raw.title,
        defaults,
    })
}
