use crate::cook_jobs::DEFAULT_FAILURE_ABORT_THRESHOLD;
use crate::depot::FilesystemDepot;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
pub struct DepotMountJson {
    pub prefix: String,
    pub path: String,
}

#[derive(Serialize, Deserialize)]
pub struct KilnProjectConfigurationJson {
    pub depot_mounts: Vec<DepotMountJson>,
    pub output_dir: String,
    pub failure_abort_threshold: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DepotMount {
    // Prefix in the unified depot namespace ("" for the root mount)
    pub prefix: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct KilnProjectConfiguration {
    // Source directories attached into the depot namespace
    pub depot_mounts: Vec<DepotMount>,

    // Cooked outputs are written under <output_dir>/cooked/
    pub output_dir: PathBuf,

    // How many cook failures one run tolerates before aborting outright
    pub failure_abort_threshold: u32,
}

impl KilnProjectConfiguration {
    pub fn unverified_absolute_path(
        root_path: &Path,
        json_path: &str,
    ) -> PathBuf {
        if Path::new(json_path).is_absolute() {
            PathBuf::from(json_path)
        } else {
            root_path.join(json_path)
        }
    }

    // root_path is the path the json file is in, json_path is the string in
    // json that is meant to be parsed/converted to a canonicalized path
    pub fn parse_dir_path(
        root_path: &Path,
        json_path: &str,
    ) -> Result<PathBuf, Box<dyn Error>> {
        // If it's not an absolute path, join it onto the path containing the
        // project file
        let joined_path = Self::unverified_absolute_path(root_path, json_path);

        // Create the dir (and its parent dirs) if it doesn't exist
        if !joined_path.exists() {
            std::fs::create_dir_all(&joined_path)?;
        }

        // Canonicalize the path
        Ok(dunce::canonicalize(&joined_path).map_err(|e| e.to_string())?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, Box<dyn Error>> {
        let root_path = dunce::canonicalize(
            path.parent()
                .ok_or_else(|| "Parent of project file path could not be found".to_string())?,
        )?;
        let file_contents = std::fs::read_to_string(path)?;
        let project_file: KilnProjectConfigurationJson = serde_json::from_str(&file_contents)?;

        let output_dir = Self::parse_dir_path(&root_path, &project_file.output_dir)?;

        let mut depot_mounts = Vec::default();
        for mount in project_file.depot_mounts {
            if !mount.prefix.is_empty() && !mount.prefix.ends_with('/') {
                Err(format!(
                    "Depot mount prefix '{}' must be empty or end with a slash",
                    mount.prefix
                ))?;
            }

            depot_mounts.push(DepotMount {
                prefix: mount.prefix,
                path: Self::parse_dir_path(&root_path, &mount.path)?,
            });
        }

        Ok(KilnProjectConfiguration {
            depot_mounts,
            output_dir,
            failure_abort_threshold: project_file
                .failure_abort_threshold
                .unwrap_or(DEFAULT_FAILURE_ABORT_THRESHOLD),
        })
    }

    pub fn locate_project_file(search_location: &Path) -> Result<Self, Box<dyn Error>> {
        let mut path = Some(search_location.to_path_buf());
        while let Some(p) = path {
            let joined_path = p.join("kiln_project.json");
            if joined_path.exists() {
                log::info!("Using project configuration at {:?}", joined_path);
                return Self::read_from_path(&joined_path);
            }

            path = p.parent().map(|x| x.to_path_buf());
        }

        Err(format!(
            "kiln_project.json could not be located at {:?} or in any of its parent directories",
            search_location
        ))?
    }

    pub fn build_depot(&self) -> FilesystemDepot {
        let mut depot = FilesystemDepot::new();
        for mount in &self.depot_mounts {
            depot.add_mount(mount.prefix.clone(), &mount.path);
        }
        depot
    }
}
