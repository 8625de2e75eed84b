use crate::cooker_registry::CookerRegistry;
use crate::depot::{
    enumerate_depot_files, parse_directory_listing_path, split_extension_filter, Depot,
};
use crate::Metadata;

/// Decides whether a previously cooked output is still valid given the
/// current depot state. Stale if the recorded cooker no longer exists, if
/// its version changed, or if any recorded source dependency's timestamp
/// differs. A dependency that also recorded a content hash gets a second
/// chance: if the recomputed hash still matches, a timestamp-only change
/// (revision-control checkout and similar) does not force a recook. A single
/// stale dependency short-circuits the whole check.
#[profiling::function]
pub fn check_dependencies_up_to_date(
    depot: &dyn Depot,
    cooker_registry: &CookerRegistry,
    metadata: &Metadata,
) -> bool {
    // Direct copies were not produced by any cooker, only their dependencies
    // matter
    if !metadata.is_direct_copy() {
        match cooker_registry.cooker_version(&metadata.cooker_class) {
            None => {
                log::info!(
                    "Cooker class '{}' no longer exists for file",
                    metadata.cooker_class
                );
                return false;
            }
            Some(current_version) if current_version != metadata.cooker_version => {
                log::info!(
                    "Cooker '{}' changed version from {} -> {}",
                    metadata.cooker_class,
                    metadata.cooker_version,
                    current_version
                );
                return false;
            }
            Some(_) => {}
        }
    }

    for dep in &metadata.source_dependencies {
        if dep.directory_listing {
            let Some((dir, recurse, filter)) = parse_directory_listing_path(&dep.source_path)
            else {
                log::warn!(
                    "Unparsable directory listing dependency '{}'",
                    dep.source_path
                );
                return false;
            };

            let listing =
                enumerate_depot_files(depot, dir, recurse, &split_extension_filter(filter));
            if listing.newest_timestamp == dep.timestamp && listing.names_hash == dep.content_hash
            {
                continue;
            }

            log::info!("Dependency listing '{}' has changed", dep.source_path);
            return false;
        }

        let current_timestamp = depot
            .query_file_info(&dep.source_path)
            .map(|info| info.timestamp)
            .unwrap_or(0);

        if dep.timestamp == current_timestamp {
            continue;
        }

        if dep.content_hash != 0 {
            if depot.query_file_content_hash(&dep.source_path) == Some(dep.content_hash) {
                continue;
            }
        }

        log::info!("Dependency file '{}' has changed", dep.source_path);
        return false;
    }

    true
}
