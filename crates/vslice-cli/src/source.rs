//! Built-in analysis stages and planner over a source tree on disk

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vslice_core::{AnalysisStage, CollaboratorError, PlanningService, StageContext, StageError};
use vslice_model::{Project, Slice, SliceContract};

/// Stage name of [`InventoryStage`]
pub(crate) const INVENTORY_STAGE: &str = "inventory";
/// Stage name of [`ManifestStage`]
pub(crate) const MANIFEST_STAGE: &str = "manifest";

const SKIP_DIRS: &[&str] = &["node_modules", "target", "dist", "build", "vendor", "__pycache__"];
const MANIFESTS: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "composer.json",
    "Gemfile",
];
/// Module names every other module builds on
const SHARED_MODULES: &[&str] = &["shared", "common", "lib", "utils", "core"];
const MAX_TESTS_PER_SLICE: u32 = 10;

fn skipped(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

fn io_failure(path: &Path, err: &std::io::Error) -> StageError {
    StageError::Failed(format!("{}: {err}", path.display()))
}

/// Directory whose children become modules: `src/` when present
async fn module_base(root: &Path) -> PathBuf {
    let src = root.join("src");
    match tokio::fs::metadata(&src).await {
        Ok(meta) if meta.is_dir() => src,
        _ => root.to_path_buf(),
    }
}

/// Files under `dir`, grouped by extension
async fn count_files(dir: &Path) -> Result<(u64, BTreeMap<String, u64>), StageError> {
    let mut total = 0;
    let mut by_extension = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|err| io_failure(&current, &err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_failure(&current, &err))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| io_failure(&path, &err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if file_type.is_dir() {
                if !skipped(&name) {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                total += 1;
                let ext = path
                    .extension()
                    .map_or_else(|| "(none)".to_string(), |e| e.to_string_lossy().into_owned());
                *by_extension.entry(ext).or_insert(0) += 1;
            }
        }
    }
    Ok((total, by_extension))
}

/// Counts source files per top-level module
pub(crate) struct InventoryStage {
    root: PathBuf,
}

impl InventoryStage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AnalysisStage for InventoryStage {
    fn name(&self) -> &str {
        INVENTORY_STAGE
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, StageError> {
        let base = module_base(&self.root).await;
        let mut entries = tokio::fs::read_dir(&base)
            .await
            .map_err(|err| io_failure(&base, &err))?;

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_failure(&base, &err))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map_err(|err| io_failure(&entry.path(), &err))?
                .is_dir();
            if is_dir && !skipped(&name) {
                dirs.push((name, entry.path()));
            }
        }
        dirs.sort();

        let mut modules = Vec::new();
        let mut total = 0;
        for (name, path) in dirs {
            let (files, by_extension) = count_files(&path).await?;
            if files == 0 {
                continue;
            }
            total += files;
            modules.push(json!({ "name": name, "files": files, "extensions": by_extension }));
        }
        if modules.is_empty() {
            return Err(StageError::Failed(format!(
                "no source modules under {}",
                base.display()
            )));
        }

        // Best-effort note; the stage result is what matters.
        let _ = ctx
            .progress(format!("{} modules, {total} files", modules.len()))
            .await;
        Ok(json!({
            "base": base.display().to_string(),
            "files": total,
            "modules": modules,
        }))
    }
}

/// Detects build manifests at the source root
pub(crate) struct ManifestStage {
    root: PathBuf,
}

impl ManifestStage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AnalysisStage for ManifestStage {
    fn name(&self) -> &str {
        MANIFEST_STAGE
    }

    fn required(&self) -> bool {
        false
    }

    async fn run(&self, _ctx: &StageContext) -> Result<Value, StageError> {
        let mut found = Vec::new();
        let mut details = Map::new();
        for manifest in MANIFESTS {
            let path = self.root.join(manifest);
            let Ok(text) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            found.push(Value::from(*manifest));
            if *manifest == "package.json" {
                let package: Value = serde_json::from_str(&text)
                    .map_err(|err| StageError::Failed(format!("package.json: {err}")))?;
                details.insert("name".into(), package["name"].clone());
                details.insert("scripts".into(), package["scripts"].clone());
            }
        }
        if found.is_empty() {
            return Err(StageError::Failed(format!(
                "no build manifest in {}",
                self.root.display()
            )));
        }
        details.insert("manifests".into(), Value::Array(found));
        Ok(Value::Object(details))
    }

    async fn fallback(&self, _ctx: &StageContext) -> Option<Result<Value, StageError>> {
        Some(Ok(json!({ "manifests": [] })))
    }
}

/// One slice per inventoried module
///
/// Shared modules (`shared`, `common`, `lib`, `utils`, `core`) come first and
/// every other slice depends on them.
#[derive(Debug, Default)]
pub(crate) struct DirectoryPlanner;

#[async_trait]
impl PlanningService for DirectoryPlanner {
    async fn plan(
        &self,
        project: &Project,
        stage_results: &BTreeMap<String, Value>,
    ) -> Result<Vec<Slice>, CollaboratorError> {
        let modules = stage_results
            .get(INVENTORY_STAGE)
            .and_then(|inventory| inventory["modules"].as_array())
            .ok_or_else(|| {
                CollaboratorError::InvalidResponse("inventory result has no modules".into())
            })?;

        let mut shared = Vec::new();
        let mut features = Vec::new();
        for module in modules {
            let name = module["name"].as_str().ok_or_else(|| {
                CollaboratorError::InvalidResponse(format!("module without a name: {module}"))
            })?;
            let files = module["files"].as_u64().unwrap_or(0);
            let tests = u32::try_from(files)
                .unwrap_or(MAX_TESTS_PER_SLICE)
                .clamp(1, MAX_TESTS_PER_SLICE);
            let contract = SliceContract::new(format!("Migrate the {name} module"))
                .with_criteria(vec![
                    format!("{name} behaves as before"),
                    format!("{name} has tests covering its entry points"),
                ])
                .with_required_tests(tests);
            let slice = Slice::new(project.id, name, contract);
            if SHARED_MODULES.contains(&name) {
                shared.push(slice);
            } else {
                features.push(slice);
            }
        }

        let mut plan = Vec::with_capacity(shared.len() + features.len());
        for (priority, slice) in shared.iter().enumerate() {
            plan.push(slice.clone().with_priority(u32::try_from(priority).unwrap_or(u32::MAX)));
        }
        let offset = shared.len();
        for (index, mut slice) in features.into_iter().enumerate() {
            for base in &shared {
                slice = slice.depends_on(base.id);
            }
            plan.push(slice.with_priority(u32::try_from(offset + index).unwrap_or(u32::MAX)));
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vslice_core::Reporter;
    use vslice_events::{ConfidenceAggregator, MemoryEventSink};
    use vslice_model::ProjectId;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn context(stage: &str) -> StageContext {
        let sink = Arc::new(MemoryEventSink::new(Arc::new(ConfidenceAggregator::new(0.85))));
        let reporter = Reporter::new(sink, 1, std::time::Duration::ZERO);
        StageContext::new(ProjectId::new(), stage, reporter)
    }

    fn legacy_app() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "package.json", r#"{"name":"legacy-shop","scripts":{"test":"jest"}}"#);
        write(root, "src/orders/index.js", "module.exports = {}");
        write(root, "src/orders/api.js", "");
        write(root, "src/shared/db.js", "");
        write(root, "src/catalog/list.jsx", "");
        write(root, "src/catalog/node_modules/dep/index.js", "");
        write(root, "src/assets/.keep", "");
        dir
    }

    #[tokio::test]
    async fn inventory_counts_modules() {
        let dir = legacy_app();
        let result = InventoryStage::new(dir.path())
            .run(&context(INVENTORY_STAGE))
            .await
            .unwrap();

        let names: Vec<_> = result["modules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["assets", "catalog", "orders", "shared"]);
        assert_eq!(result["modules"][0]["files"], 1);
        assert_eq!(result["modules"][2]["extensions"]["js"], 2);
        assert_eq!(result["files"], 5);
    }

    #[tokio::test]
    async fn inventory_of_empty_tree_fails() {
        let dir = TempDir::new().unwrap();
        let err = InventoryStage::new(dir.path())
            .run(&context(INVENTORY_STAGE))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Failed(_)));
    }

    #[tokio::test]
    async fn manifest_reads_package_json() {
        let dir = legacy_app();
        let stage = ManifestStage::new(dir.path());
        let result = stage.run(&context(MANIFEST_STAGE)).await.unwrap();
        assert_eq!(result["name"], "legacy-shop");
        assert_eq!(result["manifests"], json!(["package.json"]));
        assert!(!stage.required());
    }

    #[tokio::test]
    async fn missing_manifest_falls_back() {
        let dir = TempDir::new().unwrap();
        let stage = ManifestStage::new(dir.path());
        let ctx = context(MANIFEST_STAGE);
        assert!(stage.run(&ctx).await.is_err());
        assert_eq!(
            stage.fallback(&ctx).await.unwrap().unwrap(),
            json!({ "manifests": [] })
        );
    }

    #[tokio::test]
    async fn shared_modules_are_dependencies() {
        let project = Project::new("shop");
        let mut results = BTreeMap::new();
        results.insert(
            INVENTORY_STAGE.to_string(),
            json!({ "modules": [
                { "name": "catalog", "files": 40 },
                { "name": "shared", "files": 3 },
                { "name": "orders", "files": 0 },
            ]}),
        );

        let plan = DirectoryPlanner.plan(&project, &results).await.unwrap();
        let names: Vec<_> = plan.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["shared", "catalog", "orders"]);

        let shared = plan[0].id;
        assert!(plan[0].dependencies.is_empty());
        assert!(plan[1].dependencies.contains(&shared));
        assert!(plan[2].dependencies.contains(&shared));
        assert_eq!(plan[1].contract.required_tests, MAX_TESTS_PER_SLICE);
        assert_eq!(plan[2].contract.required_tests, 1);
        assert!(plan.iter().all(|s| s.project_id == project.id));
    }

    #[tokio::test]
    async fn planner_rejects_missing_inventory() {
        let err = DirectoryPlanner
            .plan(&Project::new("x"), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidResponse(_)));
    }
}
