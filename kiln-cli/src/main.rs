use kiln_pipeline::{
    CookJobs, CookJobsConfig, CookerPluginRegistryBuilders, DependencyTracker,
    KilnProjectConfiguration, NoLiveObjects, ReloadingResourceLoader,
};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "kiln", about = "Cooks source assets into runtime resources")]
struct KilnCliArgs {
    /// Directory cooked outputs are written to (under <out-dir>/cooked/)
    #[structopt(long, parse(from_os_str))]
    out_dir: PathBuf,

    /// Do not capture per-file cook logs
    #[structopt(long)]
    verbose_logs: bool,

    /// Retain per-file cook logs even for successful cooks
    #[structopt(long)]
    keep_all_logs: bool,

    /// Path to kiln_project.json; located by upward search from the current
    /// directory when omitted
    #[structopt(long, parse(from_os_str))]
    project: Option<PathBuf>,
}

fn run(args: KilnCliArgs) -> Result<bool, Box<dyn std::error::Error>> {
    let project = match &args.project {
        Some(path) => KilnProjectConfiguration::read_from_path(path)?,
        None => KilnProjectConfiguration::locate_project_file(&std::env::current_dir()?)?,
    };

    if project.depot_mounts.is_empty() {
        Err("Project configuration declares no depot mounts, nothing to cook from")?;
    }

    log::info!("Cooking output directory: '{}'", args.out_dir.display());

    let depot = Arc::new(project.build_depot());

    // Only the built-in classes here; engine asset plugins register theirs
    // before building the registries
    let registries = CookerPluginRegistryBuilders::new().finish();

    let loader = ReloadingResourceLoader::new(
        depot.clone(),
        registries.type_registry.clone(),
        registries.cooker_registry.clone(),
        Arc::new(DependencyTracker::new()),
        Arc::new(NoLiveObjects),
    );

    let mut config = CookJobsConfig::new(args.out_dir.clone());
    config.capture_logs = !args.verbose_logs;
    config.keep_all_logs = args.keep_all_logs;
    config.failure_abort_threshold = project.failure_abort_threshold;

    let mut cook_jobs = CookJobs::new(
        depot,
        registries.type_registry,
        registries.cooker_registry,
        loader,
        config,
    );

    let (statistics, _log_data) = cook_jobs.run();

    log::info!(
        "Total {} files processed",
        statistics.visited
    );

    Ok(statistics.success())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = KilnCliArgs::from_args();
    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
