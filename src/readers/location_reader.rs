use crate::error::{PipelineError, Result};
use crate::models::Location;
use crate::readers::LocationSource;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use validator::Validate;

/// Reads the location definition: a JSON array of `{"lat": .., "lon": ..}`.
pub struct LocationReader {
    path: PathBuf,
}

impl LocationReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate every location in the file
    pub fn read_locations(&self) -> Result<Vec<Location>> {
        if !self.path.exists() {
            return Err(PipelineError::Config(format!(
                "Location file not found: {}",
                self.path.display()
            )));
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Config(format!(
                "Cannot read location file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let locations = parse_locations(&content)?;
        info!(
            count = locations.len(),
            path = %self.path.display(),
            "Loaded locations"
        );

        Ok(locations)
    }
}

impl LocationSource for LocationReader {
    fn load(&self) -> Result<Vec<Location>> {
        self.read_locations()
    }
}

/// Parse a location definition from JSON text
pub fn parse_locations(content: &str) -> Result<Vec<Location>> {
    let locations: Vec<Location> = serde_json::from_str(content)
        .map_err(|e| PipelineError::Config(format!("Malformed location definition: {}", e)))?;

    validate_locations(&locations)?;
    Ok(locations)
}

/// Reject an empty definition or any coordinate outside the valid ranges
pub fn validate_locations(locations: &[Location]) -> Result<()> {
    if locations.is_empty() {
        return Err(PipelineError::Config(
            "Location definition contains no locations".to_string(),
        ));
    }

    for (index, location) in locations.iter().enumerate() {
        location
            .validate()
            .map_err(|e| PipelineError::InvalidLocation {
                index,
                message: format!("{} is out of range: {}", location, e),
            })?;
    }

    Ok(())
}
