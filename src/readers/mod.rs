pub mod location_reader;

pub use location_reader::{parse_locations, validate_locations, LocationReader};

use crate::error::Result;
use crate::models::Location;

/// Supplies the ordered locations for a run. No network access.
pub trait LocationSource: Send + Sync {
    fn load(&self) -> Result<Vec<Location>>;
}

/// Fixed, in-memory location list. Validated on every load like a file would be.
impl LocationSource for Vec<Location> {
    fn load(&self) -> Result<Vec<Location>> {
        validate_locations(self)?;
        Ok(self.clone())
    }
}
