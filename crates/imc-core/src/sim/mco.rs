//! Reader for the MCML output (`.mco`) file.
//!
//! Only the two reflectance scalars are extracted. MCML writes them in the
//! `RAT` block as a number followed by a comment:
//!
//! ```text
//! RAT #Reflectance, absorption, transmission.
//! 0.0278    #Specular reflectance [-]
//! 0.342     #Diffuse reflectance [-]
//! ```

use std::path::Path;

use super::SimError;
use crate::types::Reflectance;

const SPECULAR_KEY: &str = "Specular reflectance";
const DIFFUSE_KEY: &str = "Diffuse reflectance";

/// Parse reflectance from output file text.
pub fn parse_mco_str(content: &str) -> Result<Reflectance, SimError> {
    let mut specular = None;
    let mut diffuse = None;

    for (i, line) in content.lines().enumerate() {
        let slot = if line.contains(SPECULAR_KEY) {
            &mut specular
        } else if line.contains(DIFFUSE_KEY) {
            &mut diffuse
        } else {
            continue;
        };
        if slot.is_some() {
            continue;
        }
        let token = line.split_whitespace().next().unwrap_or_default();
        let value: f64 = token.parse().map_err(|_| SimError::Parse {
            line: i + 1,
            message: format!("Invalid reflectance value '{}'", token),
        })?;
        *slot = Some(value);
    }

    match (diffuse, specular) {
        (Some(d), Some(s)) => Ok(Reflectance::new(d, s)),
        (None, _) => Err(SimError::Parse {
            line: 0,
            message: format!("No '{}' line", DIFFUSE_KEY),
        }),
        (_, None) => Err(SimError::Parse {
            line: 0,
            message: format!("No '{}' line", SPECULAR_KEY),
        }),
    }
}

/// Parse reflectance from an output file on disk.
pub fn parse_mco(path: &Path) -> Result<Reflectance, SimError> {
    let content = std::fs::read_to_string(path)?;
    parse_mco_str(&content)
}
