use crate::depot::{Depot, FilesystemDepot};
use crate::{
    CookJobs, CookJobsConfig, CookedResource, Cooker, CookerPlugin, CookerPluginRegistries,
    CookerPluginRegistryBuilders, CookerPluginSetupContext, CookerRegistration, DependencyTracker,
    LiveObjectDirectory, NoLiveObjects, PipelineResult, ReloadObserver, ReloadingResourceLoader,
    Resource, ResourceClassDef, ResourceClassName, ResourceCooker, ResourceKey, ResourceLoader,
    ResourcePtr, SeedFile, SeedFileEntry,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

//
// Test resource types
//

struct TestTexture {
    pixels: Vec<u8>,
}

impl Resource for TestTexture {
    fn class_name(&self) -> ResourceClassName {
        ResourceClassName::from("StaticTexture")
    }

    fn serialize_payload(&self) -> PipelineResult<Vec<u8>> {
        Ok(self.pixels.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct TestMaterial {
    textures: Vec<ResourceKey>,
}

impl Resource for TestMaterial {
    fn class_name(&self) -> ResourceClassName {
        ResourceClassName::from("Material")
    }

    fn serialize_payload(&self) -> PipelineResult<Vec<u8>> {
        let paths: Vec<&str> = self.textures.iter().map(|key| key.path()).collect();
        Ok(bincode::serialize(&paths)?)
    }

    fn referenced_resources(&self) -> Vec<ResourceKey> {
        self.textures.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct ChainLink {
    next: Option<ResourceKey>,
}

impl Resource for ChainLink {
    fn class_name(&self) -> ResourceClassName {
        ResourceClassName::from("ChainLink")
    }

    fn serialize_payload(&self) -> PipelineResult<Vec<u8>> {
        Ok(bincode::serialize(
            &self.next.as_ref().map(|key| key.path().to_string()),
        )?)
    }

    fn referenced_resources(&self) -> Vec<ResourceKey> {
        self.next.iter().cloned().collect()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct NoteText {
    text: String,
}

impl Resource for NoteText {
    fn class_name(&self) -> ResourceClassName {
        ResourceClassName::from("NoteText")
    }

    fn serialize_payload(&self) -> PipelineResult<Vec<u8>> {
        Ok(bincode::serialize(&self.text)?)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

//
// Test cookers
//

struct PngTextureCooker;

impl ResourceCooker for PngTextureCooker {
    fn cook(
        &self,
        context: &mut crate::CookContext,
    ) -> PipelineResult<ResourcePtr> {
        let path = context.resource_path().to_string();
        let pixels = context.load_to_buffer(&path)?;
        Ok(Arc::new(TestTexture { pixels }))
    }
}

// Source .mat files list one relative texture path per line. The cooked
// material references the textures as resources, pulling their dependencies
// into its own.
struct MaterialCooker;

impl ResourceCooker for MaterialCooker {
    fn cook(
        &self,
        context: &mut crate::CookContext,
    ) -> PipelineResult<ResourcePtr> {
        let path = context.resource_path().to_string();
        let source = context.load_to_string(&path)?;

        let mut textures = Vec::default();
        for line in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let texture_path = context
                .query_resolved_path(line, None, true)
                .ok_or_else(|| format!("Unresolvable texture reference '{}'", line))?;
            let key = ResourceKey::new(texture_path, ResourceClassName::from("ITexture"));
            context.load_dependency_resource(&key)?;
            textures.push(key);
        }

        Ok(Arc::new(TestMaterial { textures }))
    }
}

// Source .chain files contain an optional relative path to the next link,
// allowing reference cycles between cooked resources.
struct ChainLinkCooker;

impl ResourceCooker for ChainLinkCooker {
    fn cook(
        &self,
        context: &mut crate::CookContext,
    ) -> PipelineResult<ResourcePtr> {
        let path = context.resource_path().to_string();
        let source = context.load_to_string(&path)?;
        let target = source.trim();

        let next = if target.is_empty() {
            None
        } else {
            let next_path = context
                .query_resolved_path(target, None, true)
                .ok_or_else(|| format!("Unresolvable chain reference '{}'", target))?;
            Some(ResourceKey::new(
                next_path,
                ResourceClassName::from("ChainLink"),
            ))
        };

        Ok(Arc::new(ChainLink { next }))
    }
}

struct AlwaysFailingCooker;

impl ResourceCooker for AlwaysFailingCooker {
    fn cook(
        &self,
        _context: &mut crate::CookContext,
    ) -> PipelineResult<ResourcePtr> {
        Err("this cooker always fails")?
    }
}

struct TestPlugin;

impl CookerPlugin for TestPlugin {
    fn setup(context: CookerPluginSetupContext) {
        context.type_registry.register_class(ResourceClassDef::new("ITexture"));
        context.type_registry.register_class(
            ResourceClassDef::new("StaticTexture")
                .with_parent("ITexture")
                .with_load_extension("statictexture"),
        );
        context.type_registry.register_class(
            ResourceClassDef::new("Material").with_load_extension("material"),
        );
        context.type_registry.register_class(
            ResourceClassDef::new("ChainLink").with_load_extension("chainlink"),
        );
        context.type_registry.register_class(
            ResourceClassDef::new("Mesh").with_load_extension("mesh"),
        );
        context.type_registry.register_class(
            ResourceClassDef::new("NoteText")
                .with_load_extension("note")
                .with_text_loader(Arc::new(|data| {
                    let text = String::from_utf8(data.to_vec())
                        .map_err(|_| "Note file is not valid UTF-8".to_string())?;
                    Ok(Arc::new(NoteText { text }) as ResourcePtr)
                })),
        );

        context.cooker_registry.register_cooker(CookerRegistration {
            name: "PngTextureCooker".to_string(),
            version: 1,
            source_extensions: vec!["png".to_string()],
            source_classes: vec![],
            target_classes: vec![ResourceClassName::from("StaticTexture")],
            cooker: Arc::new(PngTextureCooker),
        });
        context.cooker_registry.register_cooker(CookerRegistration {
            name: "MaterialCooker".to_string(),
            version: 1,
            source_extensions: vec!["mat".to_string()],
            source_classes: vec![],
            target_classes: vec![ResourceClassName::from("Material")],
            cooker: Arc::new(MaterialCooker),
        });
        context.cooker_registry.register_cooker(CookerRegistration {
            name: "ChainLinkCooker".to_string(),
            version: 1,
            source_extensions: vec!["chain".to_string()],
            source_classes: vec![],
            target_classes: vec![ResourceClassName::from("ChainLink")],
            cooker: Arc::new(ChainLinkCooker),
        });
        context.cooker_registry.register_cooker(CookerRegistration {
            name: "AlwaysFailingCooker".to_string(),
            version: 1,
            source_extensions: vec!["bad".to_string()],
            source_classes: vec![],
            target_classes: vec![ResourceClassName::from("Mesh")],
            cooker: Arc::new(AlwaysFailingCooker),
        });
    }
}

//
// Fixture
//

struct PipelineFixture {
    temp: tempfile::TempDir,
    depot: Arc<FilesystemDepot>,
    registries: CookerPluginRegistries,
    loader: Arc<ReloadingResourceLoader>,
}

impl PipelineFixture {
    fn new() -> Self {
        Self::with_live_objects(Arc::new(NoLiveObjects))
    }

    fn with_live_objects(live_objects: Arc<dyn LiveObjectDirectory>) -> Self {
        init_logging();

        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("depot")).unwrap();

        let mut depot = FilesystemDepot::new();
        depot.add_mount("", &temp.path().join("depot"));
        let depot = Arc::new(depot);

        let registries = CookerPluginRegistryBuilders::new()
            .register_plugin::<TestPlugin>()
            .finish();

        let loader = ReloadingResourceLoader::new(
            depot.clone(),
            registries.type_registry.clone(),
            registries.cooker_registry.clone(),
            Arc::new(DependencyTracker::new()),
            live_objects,
        );

        PipelineFixture {
            temp,
            depot,
            registries,
            loader,
        }
    }

    fn write_depot_file(
        &self,
        path: &str,
        content: &[u8],
    ) {
        let full_path = self.temp.path().join("depot").join(path);
        std::fs::create_dir_all(full_path.parent().unwrap()).unwrap();
        std::fs::write(full_path, content).unwrap();
    }

    fn write_seed_file(
        &self,
        path: &str,
        entries: &[(&str, &str)],
    ) {
        let seed_file = SeedFile {
            files: entries
                .iter()
                .map(|(relative_path, resource_class)| SeedFileEntry {
                    relative_path: relative_path.to_string(),
                    resource_class: resource_class.to_string(),
                })
                .collect(),
        };
        self.write_depot_file(path, seed_file.to_json_string().unwrap().as_bytes());
    }

    fn output_root(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    fn cooked_path(
        &self,
        relative: &str,
    ) -> PathBuf {
        self.output_root().join("cooked").join(relative)
    }

    fn cook_jobs(&self) -> CookJobs {
        CookJobs::new(
            self.depot.clone(),
            self.registries.type_registry.clone(),
            self.registries.cooker_registry.clone(),
            self.loader.clone(),
            CookJobsConfig::new(self.output_root()),
        )
    }

    fn load_output_metadata(
        &self,
        relative: &str,
    ) -> crate::Metadata {
        let mut file = std::fs::File::open(self.cooked_path(relative)).unwrap();
        crate::storage::load_cooked_metadata(&mut file)
            .unwrap()
            .unwrap()
    }
}

//
// Tests
//

// A seed referencing an uncookable mesh and a cookable texture: the mesh is
// skipped with a warning (not a failure), the texture cooks to the path
// derived from its resolved concrete class.
#[test]
fn cooks_seeded_depot_and_skips_uncookable_resources() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("textures/wall.png", b"not really a png");
    fixture.write_depot_file("models/barrel.vmesh", b"vertices");
    fixture.write_seed_file(
        "level.seeds",
        &[
            ("models/barrel.vmesh", "Mesh"),
            ("textures/wall.png", "ITexture"),
        ],
    );

    let mut cook_jobs = fixture.cook_jobs();
    let (statistics, _log) = cook_jobs.run();

    assert_eq!(statistics.cooked, 1);
    assert_eq!(statistics.failed, 0);
    assert!(statistics.success());

    let output = fixture.cooked_path("textures/wall.statictexture");
    assert!(output.exists(), "missing {:?}", output);

    let mut file = std::fs::File::open(&output).unwrap();
    let payload = crate::storage::load_cooked_payload(&mut file).unwrap();
    assert_eq!(payload, b"not really a png");

    let metadata = fixture.load_output_metadata("textures/wall.statictexture");
    assert_eq!(metadata.cooker_class, "PngTextureCooker");
    assert!(metadata
        .source_dependencies
        .iter()
        .any(|dep| dep.source_path == "textures/wall.png"));
}

// Running twice on an unchanged depot cooks nothing the second time and
// leaves outputs byte-for-byte identical.
#[test]
fn second_run_on_unchanged_depot_is_all_up_to_date() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("textures/wall.png", b"pixels");
    fixture.write_depot_file("materials/wall.mat", b"../textures/wall.png\n");
    fixture.write_seed_file("level.seeds", &[("materials/wall.mat", "Material")]);

    let mut cook_jobs = fixture.cook_jobs();
    let (first, _log) = cook_jobs.run();
    assert_eq!(first.cooked, 2);
    assert!(first.success());

    let material_bytes =
        std::fs::read(fixture.cooked_path("materials/wall.material")).unwrap();
    let texture_bytes =
        std::fs::read(fixture.cooked_path("textures/wall.statictexture")).unwrap();

    let (second, _log) = cook_jobs.run();
    assert_eq!(second.cooked, 0);
    assert_eq!(second.failed, 0);
    assert!(second.up_to_date >= 2);
    assert!(second.success());

    assert_eq!(
        std::fs::read(fixture.cooked_path("materials/wall.material")).unwrap(),
        material_bytes
    );
    assert_eq!(
        std::fs::read(fixture.cooked_path("textures/wall.statictexture")).unwrap(),
        texture_bytes
    );
}

// Touching a source dependency recooks everything that recorded it,
// including resources that consumed it indirectly through a dependency
// resource load, and the new metadata reflects the new state.
#[test]
fn touching_a_dependency_invalidates_its_consumers() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("textures/wall.png", b"old pixels");
    fixture.write_depot_file("materials/wall.mat", b"../textures/wall.png\n");
    fixture.write_seed_file("level.seeds", &[("materials/wall.mat", "Material")]);

    let mut cook_jobs = fixture.cook_jobs();
    let (first, _log) = cook_jobs.run();
    assert_eq!(first.cooked, 2);

    // The material's flattened dependency list records the texture source
    let material_metadata = fixture.load_output_metadata("materials/wall.material");
    let recorded_dep = material_metadata
        .source_dependencies
        .iter()
        .find(|dep| dep.source_path == "textures/wall.png")
        .expect("material must record the texture source")
        .clone();

    std::thread::sleep(Duration::from_millis(50));
    fixture.write_depot_file("textures/wall.png", b"new pixels, longer");

    let (second, _log) = cook_jobs.run();
    assert_eq!(second.cooked, 2, "material and texture must both recook");
    assert!(second.success());

    let new_metadata = fixture.load_output_metadata("materials/wall.material");
    let new_dep = new_metadata
        .source_dependencies
        .iter()
        .find(|dep| dep.source_path == "textures/wall.png")
        .unwrap();
    assert_ne!(new_dep.timestamp, recorded_dep.timestamp);
    assert_ne!(new_dep.size, recorded_dep.size);

    let mut file =
        std::fs::File::open(fixture.cooked_path("textures/wall.statictexture")).unwrap();
    let payload = crate::storage::load_cooked_payload(&mut file).unwrap();
    assert_eq!(payload, b"new pixels, longer");
}

// A two-resource reference cycle terminates: every key reachable from the
// seed set is visited at most once.
#[test]
fn cyclic_references_terminate() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("links/a.chain", b"b.chain");
    fixture.write_depot_file("links/b.chain", b"a.chain");
    fixture.write_seed_file("level.seeds", &[("links/a.chain", "ChainLink")]);

    let mut cook_jobs = fixture.cook_jobs();
    let (statistics, _log) = cook_jobs.run();

    assert_eq!(statistics.cooked, 2);
    assert_eq!(statistics.failed, 0);
    assert!(statistics.success());
    assert!(fixture.cooked_path("links/a.chainlink").exists());
    assert!(fixture.cooked_path("links/b.chainlink").exists());

    // And the second run short-circuits through the up-to-date path without
    // looping either
    let (second, _log) = cook_jobs.run();
    assert_eq!(second.cooked, 0);
    assert!(second.up_to_date >= 2);
}

// A text resource whose path extension equals its class's load extension,
// with no explicit cooker registered, loads directly: success, counted as a
// copy, not stamped by any cooker.
#[test]
fn self_cooking_text_resources_pass_through() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("notes/readme.note", b"hello");
    fixture.write_seed_file("level.seeds", &[("notes/readme.note", "NoteText")]);

    let mut cook_jobs = fixture.cook_jobs();
    let (statistics, _log) = cook_jobs.run();

    assert_eq!(statistics.copied, 1);
    assert_eq!(statistics.cooked, 0);
    assert!(statistics.success());

    let metadata = fixture.load_output_metadata("notes/readme.note");
    assert!(metadata.is_direct_copy());

    // Direct copies are up to date on the next run like everything else
    let (second, _log) = cook_jobs.run();
    assert_eq!(second.copied, 0);
    assert_eq!(second.up_to_date, 1);
}

// The cooker itself stamps no metadata on the self-cook path: whatever the
// dependency loader returns is passed through untouched, distinguishing "no
// cook needed" from "cook failed".
#[test]
fn cooker_self_cook_path_stamps_no_metadata() {
    struct PlainLoader {
        registries: CookerPluginRegistries,
        depot: Arc<FilesystemDepot>,
    }

    impl ResourceLoader for PlainLoader {
        fn load_resource(
            &self,
            key: &ResourceKey,
        ) -> PipelineResult<CookedResource> {
            let text_loader = self
                .registries
                .type_registry
                .text_loader(key.class())
                .ok_or("not a text resource")?;
            let mut data = Vec::default();
            let mut reader = self
                .depot
                .create_file_reader(key.path())
                .ok_or("missing file")?;
            std::io::Read::read_to_end(&mut reader, &mut data)?;
            Ok(CookedResource {
                resource: text_loader(&data)?,
                metadata: None,
            })
        }
    }

    let fixture = PipelineFixture::new();
    fixture.write_depot_file("notes/readme.note", b"hello");

    let cooker = Cooker::new(
        fixture.depot.clone(),
        fixture.registries.type_registry.clone(),
        fixture.registries.cooker_registry.clone(),
        true,
        None,
    );
    let loader = PlainLoader {
        registries: CookerPluginRegistryBuilders::new()
            .register_plugin::<TestPlugin>()
            .finish(),
        depot: fixture.depot.clone(),
    };

    let key = ResourceKey::new("notes/readme.note", ResourceClassName::from("NoteText"));
    let cooked = cooker.cook(&key, &loader).unwrap();
    assert!(cooked.metadata.is_none());
    let note = cooked.resource.as_any().downcast_ref::<NoteText>().unwrap();
    assert_eq!(note.text, "hello");

    // A failing cook is an error, not a silent pass-through
    let missing = ResourceKey::new("notes/missing.note", ResourceClassName::from("NoteText"));
    assert!(cooker.cook(&missing, &loader).is_err());
}

// Exceeding the failure threshold aborts the run before the remaining
// entries are processed.
#[test]
fn mass_failure_aborts_the_run() {
    let fixture = PipelineFixture::new();

    let total_entries = 120u32;
    let mut entries = Vec::default();
    for i in 0..total_entries {
        let path = format!("broken/file{:03}.bad", i);
        fixture.write_depot_file(&path, b"junk");
        entries.push((path, "Mesh".to_string()));
    }
    let entry_refs: Vec<(&str, &str)> = entries
        .iter()
        .map(|(path, class)| (path.as_str(), class.as_str()))
        .collect();
    fixture.write_seed_file("level.seeds", &entry_refs);

    let mut cook_jobs = fixture.cook_jobs();
    let (statistics, _log) = cook_jobs.run();

    assert!(statistics.aborted);
    assert!(!statistics.success());
    assert_eq!(
        statistics.failed,
        crate::DEFAULT_FAILURE_ABORT_THRESHOLD + 1
    );
    assert!(
        statistics.visited < total_entries,
        "the walk must stop before processing every entry ({} visited)",
        statistics.visited
    );
}

// Failed cooks leave a .log file beside the would-be output for diagnosis;
// successful cooks clean theirs up.
#[test]
fn failed_cooks_retain_their_log_files() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("broken/one.bad", b"junk");
    fixture.write_depot_file("textures/ok.png", b"pixels");
    fixture.write_seed_file(
        "level.seeds",
        &[("broken/one.bad", "Mesh"), ("textures/ok.png", "ITexture")],
    );

    let mut cook_jobs = fixture.cook_jobs();
    let (statistics, _log) = cook_jobs.run();
    assert_eq!(statistics.failed, 1);
    assert_eq!(statistics.cooked, 1);

    let failed_log = fixture.output_root().join("cooked/broken/one.mesh.log");
    assert!(failed_log.exists());
    let text = std::fs::read_to_string(failed_log).unwrap();
    assert!(text.contains("ERROR"));

    let ok_log = fixture
        .output_root()
        .join("cooked/textures/ok.statictexture.log");
    assert!(!ok_log.exists());
}

//
// Reload
//

struct TextureHolder {
    current: Mutex<Option<ResourcePtr>>,
}

impl ReloadObserver for TextureHolder {
    fn on_resource_reloading(
        &self,
        old_resource: &ResourcePtr,
        _new_resource: &ResourcePtr,
    ) -> bool {
        let current = self.current.lock().unwrap();
        match &*current {
            Some(held) => Arc::ptr_eq(held, old_resource),
            None => false,
        }
    }

    fn on_resource_reload_finished(
        &self,
        _old_resource: &ResourcePtr,
        new_resource: &ResourcePtr,
    ) {
        *self.current.lock().unwrap() = Some(new_resource.clone());
    }
}

struct TestObjectDirectory {
    objects: Mutex<Vec<Arc<TextureHolder>>>,
}

impl LiveObjectDirectory for TestObjectDirectory {
    fn iterate_objects(
        &self,
        callback: &mut dyn FnMut(&dyn ReloadObserver),
    ) {
        for object in self.objects.lock().unwrap().iter() {
            callback(&**object);
        }
    }
}

fn pump_until<F: FnMut() -> bool>(
    loader: &Arc<ReloadingResourceLoader>,
    mut done: F,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        loader.update();
        if done() && !loader.is_reloading() {
            return;
        }
        assert!(Instant::now() < deadline, "reload did not finish in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

// Changing a watched source file reloads the one loaded resource that
// depends on it and swaps the new version into live objects.
#[test]
fn changed_source_files_reload_loaded_resources() {
    let holder = Arc::new(TextureHolder {
        current: Mutex::new(None),
    });
    let directory = Arc::new(TestObjectDirectory {
        objects: Mutex::new(vec![holder.clone()]),
    });
    let fixture = PipelineFixture::with_live_objects(directory);

    fixture.write_depot_file("notes/readme.note", b"version one");

    let key = ResourceKey::new("notes/readme.note", ResourceClassName::from("NoteText"));
    let loaded = fixture.loader.load_resource(&key).unwrap();
    *holder.current.lock().unwrap() = Some(loaded.resource.clone());
    drop(loaded);

    std::thread::sleep(Duration::from_millis(50));
    fixture.write_depot_file("notes/readme.note", b"version two");
    fixture.loader.notify_file_changed("notes/readme.note");

    let holder_for_check = holder.clone();
    pump_until(&fixture.loader, move || {
        let current = holder_for_check.current.lock().unwrap();
        current
            .as_ref()
            .and_then(|resource| resource.as_any().downcast_ref::<NoteText>())
            .map(|note| note.text == "version two")
            .unwrap_or(false)
    });

    let current = holder.current.lock().unwrap();
    let note = current
        .as_ref()
        .unwrap()
        .as_any()
        .downcast_ref::<NoteText>()
        .unwrap();
    assert_eq!(note.text, "version two");
}

// Change events for resources nobody holds are dropped: no reload starts.
#[test]
fn changes_to_unloaded_resources_are_dropped() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("notes/readme.note", b"version one");

    let key = ResourceKey::new("notes/readme.note", ResourceClassName::from("NoteText"));
    {
        // Load and immediately drop the only strong handle
        let _loaded = fixture.loader.load_resource(&key).unwrap();
    }

    fixture.write_depot_file("notes/readme.note", b"version two");
    fixture.loader.notify_file_changed("notes/readme.note");

    fixture.loader.update();
    assert!(!fixture.loader.is_reloading());

    // The next load simply picks up the new version
    let reloaded = fixture.loader.load_resource(&key).unwrap();
    let note = reloaded.resource.as_any().downcast_ref::<NoteText>().unwrap();
    assert_eq!(note.text, "version two");
}

// Loads through the loader are cached while the handle is alive, and
// invalidated when the source changes underneath.
#[test]
fn loader_reuses_live_resources_until_sources_change() {
    let fixture = PipelineFixture::new();
    fixture.write_depot_file("notes/readme.note", b"version one");

    let key = ResourceKey::new("notes/readme.note", ResourceClassName::from("NoteText"));
    let first = fixture.loader.load_resource(&key).unwrap();
    let second = fixture.loader.load_resource(&key).unwrap();
    assert!(Arc::ptr_eq(&first.resource, &second.resource));

    std::thread::sleep(Duration::from_millis(50));
    fixture.write_depot_file("notes/readme.note", b"version two changed");

    let third = fixture.loader.load_resource(&key).unwrap();
    assert!(!Arc::ptr_eq(&first.resource, &third.resource));
    let note = third.resource.as_any().downcast_ref::<NoteText>().unwrap();
    assert_eq!(note.text, "version two changed");
}
