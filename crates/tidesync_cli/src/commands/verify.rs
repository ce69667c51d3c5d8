//! Verify command implementation.

use std::path::Path;

/// Runs the verify command.
///
/// The log is opened read-only, so a torn tail is reported as found
/// instead of being repaired first.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying change log at {:?}", path);
    println!();

    let store = super::open_read_only(path)?;
    let report = store.verify()?;

    println!("Segments: {}", report.segments);
    println!("Frames:   {}", report.frames);
    println!("Changes:  {}", report.changes);
    println!();
    println!("Status: OK");

    Ok(())
}
