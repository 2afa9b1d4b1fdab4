//! Archive management
//!
//! An archive is a directory under the archive root named
//! `<stem>_<YYYYmmdd_HHMMSS>` (plus `_N` on collision) holding `model/`,
//! `textures/`, `logs/` and an `info.json` metadata file.

use crate::config::PipelineConfig;
use crate::error::ArchiveError;
use crate::materials::MaterialResolver;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const METADATA_FILE: &str = "info.json";
const MAX_ID_SUFFIX: usize = 10_000;

type Result<T> = std::result::Result<T, ArchiveError>;

/// Contents of `info.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub archive_id: String,
    pub archive_created: DateTime<Local>,
    pub original_input: String,
    pub output_model: String,
    /// Request, decision, step history, timing and issues of the job
    pub processing_info: serde_json::Value,
    pub copied_textures: Vec<String>,
    pub file_structure: BTreeMap<String, String>,
}

/// What a finished job hands over for archiving
#[derive(Debug, Clone)]
pub struct ArchiveJob<'a> {
    pub original_input: &'a Path,
    /// Final model file
    pub model: &'a Path,
    /// Material library referenced by the final model
    pub material_library: Option<&'a Path>,
    /// Directory whose files are copied into `logs/`
    pub logs_dir: Option<&'a Path>,
    pub processing_info: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: String,
    pub root: PathBuf,
    pub model_dir: PathBuf,
    pub textures_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub metadata: ArchiveMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveSummary {
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub created_at: DateTime<Local>,
    pub original_input: Option<String>,
    pub operation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveListing {
    pub archive_dir: PathBuf,
    pub archives: Vec<ArchiveSummary>,
    /// Counted over every archive, not only the listed ones
    pub total_count: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupEntry {
    pub id: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Local>,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub cutoff: DateTime<Local>,
    pub selected: Vec<CleanupEntry>,
    pub deleted_count: usize,
    pub failed_count: usize,
    /// Bytes removed, or that would be removed on a dry run
    pub freed_bytes: u64,
    pub freed_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyResult {
    pub id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub files_copied: usize,
    pub bytes_copied: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveInfo {
    pub archive_dir: PathBuf,
    pub exists: bool,
    pub total_archives: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub oldest: Option<DateTime<Local>>,
    pub newest: Option<DateTime<Local>>,
}

#[derive(Debug, Clone)]
pub struct ArchiveManager {
    root: PathBuf,
    extract_dir: PathBuf,
}

impl ArchiveManager {
    pub fn new(root: impl Into<PathBuf>, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extract_dir: extract_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.archive_dir, config.extract_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package a finished job; a partially written archive is removed on failure
    pub fn create(&self, job: &ArchiveJob<'_>) -> Result<ArchiveRecord> {
        fs::create_dir_all(&self.root).map_err(ArchiveError::io(&self.root))?;
        let created = Local::now();
        let stem = job
            .original_input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let (id, root) = self.claim(&format!("{stem}_{}", created.format("%Y%m%d_%H%M%S")))?;

        match populate(&id, &root, created, job) {
            Ok(record) => {
                info!(archive = %record.id, textures = record.metadata.copied_textures.len(), "archive created");
                Ok(record)
            }
            Err(e) => {
                warn!(archive = %id, error = %e, "archive creation failed; removing partial archive");
                if let Err(cleanup) = fs::remove_dir_all(&root) {
                    debug!(error = %cleanup, "partial archive not removed");
                }
                Err(e)
            }
        }
    }

    /// Create the archive directory exclusively, adding `_N` until a name is free
    fn claim(&self, base: &str) -> Result<(String, PathBuf)> {
        for n in 0..MAX_ID_SUFFIX {
            let id = if n == 0 { base.to_string() } else { format!("{base}_{n}") };
            let path = self.root.join(&id);
            match fs::create_dir(&path) {
                Ok(()) => return Ok((id, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ArchiveError::Io { path, source: e }),
            }
        }
        Err(ArchiveError::Io {
            path: self.root.join(base),
            source: std::io::Error::new(ErrorKind::AlreadyExists, "no free archive identifier"),
        })
    }

    /// Archives newest first, at most `limit` of them
    pub fn list(&self, limit: Option<usize>) -> Result<ArchiveListing> {
        let all = self.scan()?;
        let total_size_bytes = all.iter().map(|a| a.size_bytes).sum();
        let total_count = all.len();
        let archives = all.into_iter().take(limit.unwrap_or(usize::MAX)).collect();
        Ok(ArchiveListing {
            archive_dir: self.root.clone(),
            archives,
            total_count,
            total_size_bytes,
            total_size_mb: megabytes(total_size_bytes),
        })
    }

    /// Remove archives older than `days_to_keep` days
    pub fn clean(&self, days_to_keep: u32, dry_run: bool) -> Result<CleanupReport> {
        let cutoff = Local::now() - ChronoDuration::days(i64::from(days_to_keep));
        self.clean_before(cutoff, dry_run)
    }

    /// Remove archives created before `cutoff`; failures do not stop the sweep
    pub fn clean_before(&self, cutoff: DateTime<Local>, dry_run: bool) -> Result<CleanupReport> {
        let mut selected: Vec<CleanupEntry> = self
            .scan()?
            .into_iter()
            .filter(|a| a.created_at < cutoff)
            .map(|a| CleanupEntry {
                id: a.id,
                size_bytes: a.size_bytes,
                created_at: a.created_at,
                deleted: false,
                error: None,
            })
            .collect();

        if !dry_run {
            for entry in &mut selected {
                match fs::remove_dir_all(self.root.join(&entry.id)) {
                    Ok(()) => entry.deleted = true,
                    Err(e) => {
                        warn!(archive = %entry.id, error = %e, "failed to delete archive");
                        entry.error = Some(e.to_string());
                    }
                }
            }
        }

        let deleted_count = selected.iter().filter(|e| e.deleted).count();
        let failed_count = selected.iter().filter(|e| e.error.is_some()).count();
        let freed_bytes = selected
            .iter()
            .filter(|e| dry_run || e.deleted)
            .map(|e| e.size_bytes)
            .sum();
        info!(selected = selected.len(), deleted = deleted_count, failed = failed_count, dry_run, "archive cleanup");

        Ok(CleanupReport {
            dry_run,
            cutoff,
            selected,
            deleted_count,
            failed_count,
            freed_bytes,
            freed_mb: megabytes(freed_bytes),
        })
    }

    /// Duplicate an archive, by default into `<extract_dir>/<id>`
    pub fn copy(&self, id: &str, destination: Option<&Path>) -> Result<CopyResult> {
        if !is_valid_id(id) {
            return Err(ArchiveError::NotFound { id: id.to_string() });
        }
        let source = self.root.join(id);
        if !source.is_dir() {
            return Err(ArchiveError::NotFound { id: id.to_string() });
        }

        let destination = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.extract_dir.join(id));
        if destination.exists() {
            debug!(destination = %destination.display(), "replacing existing copy");
            fs::remove_dir_all(&destination).map_err(ArchiveError::io(&destination))?;
        }
        let (files_copied, bytes_copied) = copy_tree(&source, &destination)?;
        info!(archive = id, destination = %destination.display(), files = files_copied, "archive copied");

        Ok(CopyResult {
            id: id.to_string(),
            source,
            destination,
            files_copied,
            bytes_copied,
        })
    }

    pub fn info(&self) -> Result<ArchiveInfo> {
        let all = self.scan()?;
        let total_size_bytes = all.iter().map(|a| a.size_bytes).sum();
        Ok(ArchiveInfo {
            archive_dir: self.root.clone(),
            exists: self.root.is_dir(),
            total_archives: all.len(),
            total_size_bytes,
            total_size_mb: megabytes(total_size_bytes),
            oldest: all.iter().map(|a| a.created_at).min(),
            newest: all.iter().map(|a| a.created_at).max(),
        })
    }

    /// Every archive directory, newest first
    fn scan(&self) -> Result<Vec<ArchiveSummary>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(ArchiveError::io(&self.root))? {
            let entry = entry.map_err(ArchiveError::io(&self.root))?;
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            match summarize(&entry.path()) {
                Ok(summary) => archives.push(summary),
                Err(e) => debug!(path = %entry.path().display(), error = %e, "skipping unreadable archive"),
            }
        }
        archives.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(archives)
    }
}

fn populate(id: &str, root: &Path, created: DateTime<Local>, job: &ArchiveJob<'_>) -> Result<ArchiveRecord> {
    let model_dir = root.join("model");
    let textures_dir = root.join("textures");
    let logs_dir = root.join("logs");
    for dir in [&model_dir, &textures_dir, &logs_dir] {
        fs::create_dir(dir).map_err(ArchiveError::io(dir))?;
    }

    let model_name = job.model.file_name().ok_or_else(|| ArchiveError::Io {
        path: job.model.to_path_buf(),
        source: std::io::Error::new(ErrorKind::InvalidInput, "model path has no file name"),
    })?;
    let archived_model = model_dir.join(model_name);
    fs::copy(job.model, &archived_model).map_err(ArchiveError::io(job.model))?;

    let mut copied_textures = Vec::new();
    if let Some(library) = job.material_library {
        let set = MaterialResolver::resolve_library(library);
        let placements = set.flattened_textures();
        for (texture, name) in &placements {
            fs::copy(texture, textures_dir.join(name)).map_err(ArchiveError::io(*texture))?;
            copied_textures.push(name.clone());
        }
        let archived_names: HashMap<&Path, &str> =
            placements.iter().map(|(path, name)| (*path, name.as_str())).collect();

        let library_name = library.file_name().unwrap_or(model_name);
        let archived_library = model_dir.join(library_name);
        let rewritten = set.rewrite(&model_dir, |t| {
            t.resolved
                .as_deref()
                .and_then(|path| archived_names.get(path))
                .map(|name| textures_dir.join(name))
        });
        let written = match rewritten {
            Some(text) => fs::write(&archived_library, text),
            None => fs::copy(library, &archived_library).map(|_| ()),
        };
        written.map_err(ArchiveError::io(&archived_library))?;
    }

    if let Some(source_logs) = job.logs_dir {
        for entry in fs::read_dir(source_logs).map_err(ArchiveError::io(source_logs))? {
            let entry = entry.map_err(ArchiveError::io(source_logs))?;
            if entry.file_type().is_ok_and(|t| t.is_file()) {
                fs::copy(entry.path(), logs_dir.join(entry.file_name()))
                    .map_err(ArchiveError::io(entry.path()))?;
            }
        }
    }

    let metadata = ArchiveMetadata {
        archive_id: id.to_string(),
        archive_created: created,
        original_input: job.original_input.display().to_string(),
        output_model: archived_model.display().to_string(),
        processing_info: job.processing_info.clone(),
        copied_textures,
        file_structure: file_structure(),
    };
    let info_path = root.join(METADATA_FILE);
    fs::write(&info_path, serde_json::to_string_pretty(&metadata)?).map_err(ArchiveError::io(&info_path))?;

    Ok(ArchiveRecord {
        id: id.to_string(),
        root: root.to_path_buf(),
        model_dir,
        textures_dir,
        logs_dir,
        metadata,
    })
}

fn file_structure() -> BTreeMap<String, String> {
    [
        ("model/", "processed model and its material library"),
        ("textures/", "texture files referenced by the material library"),
        ("logs/", "job log and external tool output"),
        (METADATA_FILE, "archive metadata and processing history"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn summarize(path: &Path) -> std::io::Result<ArchiveSummary> {
    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata: Option<serde_json::Value> = fs::read_to_string(path.join(METADATA_FILE))
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok());

    let created_at = match metadata
        .as_ref()
        .and_then(|m| m.get("archive_created"))
        .and_then(|v| serde_json::from_value::<DateTime<Local>>(v.clone()).ok())
    {
        Some(created) => created,
        None => DateTime::<Local>::from(fs::metadata(path)?.modified()?),
    };
    let text_field = |pointer: &str| {
        metadata
            .as_ref()
            .and_then(|m| m.pointer(pointer))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let size_bytes = dir_size(path)?;

    Ok(ArchiveSummary {
        original_input: text_field("/original_input"),
        operation: text_field("/processing_info/decision/strategy/operation"),
        id,
        path: path.to_path_buf(),
        size_bytes,
        size_mb: megabytes(size_bytes),
        created_at,
    })
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let kind = entry.file_type()?;
        if kind.is_dir() {
            total += dir_size(&entry.path())?;
        } else if kind.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn copy_tree(source: &Path, destination: &Path) -> Result<(usize, u64)> {
    fs::create_dir_all(destination).map_err(ArchiveError::io(destination))?;
    let (mut files, mut bytes) = (0, 0);
    for entry in fs::read_dir(source).map_err(ArchiveError::io(source))? {
        let entry = entry.map_err(ArchiveError::io(source))?;
        let target = destination.join(entry.file_name());
        let kind = entry.file_type().map_err(ArchiveError::io(entry.path()))?;
        if kind.is_dir() {
            let (f, b) = copy_tree(&entry.path(), &target)?;
            files += f;
            bytes += b;
        } else {
            bytes += fs::copy(entry.path(), &target).map_err(ArchiveError::io(entry.path()))?;
            files += 1;
        }
    }
    Ok((files, bytes))
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "." && !id.contains("..") && !id.contains(['/', '\\'])
}

fn megabytes(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        input: PathBuf,
        model: PathBuf,
        library: PathBuf,
        logs: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        let logs = dir.path().join("logs");
        for d in [&src, &out, &logs] {
            fs::create_dir_all(d).unwrap();
        }
        fs::write(src.join("crate.obj"), "v 0 0 0\n").unwrap();
        fs::write(src.join("wood.png"), b"wood").unwrap();
        fs::write(src.join("wood_nrm.png"), b"normal").unwrap();
        fs::write(out.join("crate_simplify.obj"), "mtllib crate_simplify.mtl\nv 0 0 0\n").unwrap();
        fs::write(
            out.join("crate_simplify.mtl"),
            "newmtl wood\nmap_Kd ../src/wood.png\nmap_Bump -bm 0.3 ../src/wood_nrm.png\nmap_Kd ../src/wood.png\n",
        )
        .unwrap();
        fs::write(logs.join("job.log"), "started\n").unwrap();

        Fixture {
            input: src.join("crate.obj"),
            model: out.join("crate_simplify.obj"),
            library: out.join("crate_simplify.mtl"),
            logs,
            dir,
        }
    }

    fn manager(f: &Fixture) -> ArchiveManager {
        ArchiveManager::new(f.dir.path().join("archives"), f.dir.path().join("extracted"))
    }

    fn create(manager: &ArchiveManager, f: &Fixture) -> ArchiveRecord {
        manager
            .create(&ArchiveJob {
                original_input: &f.input,
                model: &f.model,
                material_library: Some(&f.library),
                logs_dir: Some(&f.logs),
                processing_info: serde_json::json!({
                    "decision": { "strategy": { "operation": "simplify" } }
                }),
            })
            .unwrap()
    }

    fn backdate(record: &ArchiveRecord, days: i64) {
        let path = record.root.join(METADATA_FILE);
        let mut metadata: ArchiveMetadata = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        metadata.archive_created = metadata.archive_created - ChronoDuration::days(days);
        fs::write(&path, serde_json::to_string_pretty(&metadata).unwrap()).unwrap();
    }

    #[test]
    fn test_create_layout() {
        let f = fixture();
        let record = create(&manager(&f), &f);

        assert!(record.id.starts_with("crate_"));
        assert!(record.model_dir.join("crate_simplify.obj").is_file());
        assert!(record.textures_dir.join("wood.png").is_file());
        assert!(record.textures_dir.join("wood_nrm.png").is_file());
        assert!(record.logs_dir.join("job.log").is_file());
        assert_eq!(record.metadata.copied_textures.len(), 2);

        let mtl = fs::read_to_string(record.model_dir.join("crate_simplify.mtl")).unwrap();
        assert_eq!(
            mtl,
            "newmtl wood\nmap_Kd ../textures/wood.png\nmap_Bump -bm 0.3 ../textures/wood_nrm.png\nmap_Kd ../textures/wood.png\n"
        );

        let info: ArchiveMetadata =
            serde_json::from_str(&fs::read_to_string(record.root.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(info, record.metadata);
        assert!(info.file_structure.contains_key("textures/"));
    }

    #[test]
    fn test_textures_sharing_a_file_name_stay_distinct() {
        let f = fixture();
        let src = f.dir.path().join("src");
        for (folder, content) in [("wood", "wood pixels"), ("metal", "metal pixels")] {
            fs::create_dir_all(src.join(folder)).unwrap();
            fs::write(src.join(folder).join("diffuse.png"), content).unwrap();
        }
        fs::write(
            &f.library,
            "newmtl wood\nmap_Kd ../src/wood/diffuse.png\nnewmtl metal\nmap_Kd ../src/metal/diffuse.png\n",
        )
        .unwrap();

        let record = create(&manager(&f), &f);

        assert_eq!(record.metadata.copied_textures, vec!["diffuse.png", "diffuse_1.png"]);
        let mtl = fs::read_to_string(record.model_dir.join("crate_simplify.mtl")).unwrap();
        assert_eq!(
            mtl,
            "newmtl wood\nmap_Kd ../textures/diffuse_1.png\nnewmtl metal\nmap_Kd ../textures/diffuse.png\n"
        );
        let read = |name: &str| fs::read_to_string(record.textures_dir.join(name)).unwrap();
        assert_eq!(read("diffuse.png"), "metal pixels");
        assert_eq!(read("diffuse_1.png"), "wood pixels");
    }

    #[test]
    fn test_ids_unique_within_a_second() {
        let f = fixture();
        let manager = manager(&f);
        let ids: HashSet<String> = (0..4).map(|_| create(&manager, &f).id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_concurrent_creators_get_distinct_ids() {
        let f = fixture();
        let manager = manager(&f);
        let ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| create(&manager, &f).id)).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let f = fixture();
        let manager = manager(&f);
        let missing = f.dir.path().join("out/absent.obj");
        let err = manager.create(&ArchiveJob {
            original_input: &f.input,
            model: &missing,
            material_library: None,
            logs_dir: None,
            processing_info: serde_json::Value::Null,
        });
        assert!(err.is_err());
        assert_eq!(manager.list(None).unwrap().total_count, 0);
    }

    #[test]
    fn test_list_newest_first_with_totals() {
        let f = fixture();
        let manager = manager(&f);
        let old = create(&manager, &f);
        backdate(&old, 3);
        let new = create(&manager, &f);

        let listing = manager.list(Some(1)).unwrap();
        assert_eq!(listing.total_count, 2);
        assert_eq!(listing.archives.len(), 1);
        assert_eq!(listing.archives[0].id, new.id);
        assert_eq!(listing.archives[0].operation.as_deref(), Some("simplify"));
        assert!(listing.total_size_bytes > listing.archives[0].size_bytes);
    }

    #[test]
    fn test_clean_dry_run_then_delete() {
        let f = fixture();
        let manager = manager(&f);
        let stale = create(&manager, &f);
        backdate(&stale, 40);
        let fresh = create(&manager, &f);

        let preview = manager.clean(30, true).unwrap();
        assert_eq!(preview.selected.len(), 1);
        assert_eq!(preview.selected[0].id, stale.id);
        assert_eq!(preview.deleted_count, 0);
        assert!(stale.root.is_dir());

        let report = manager.clean(30, false).unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(!stale.root.exists());
        assert!(fresh.root.is_dir());
    }

    #[test]
    fn test_age_falls_back_to_mtime() {
        let f = fixture();
        let manager = manager(&f);
        fs::create_dir_all(manager.root().join("legacy")).unwrap();
        assert!(manager.clean(1, true).unwrap().selected.is_empty());
        let later = manager.clean_before(Local::now() + ChronoDuration::days(1), true).unwrap();
        assert_eq!(later.selected[0].id, "legacy");
    }

    #[test]
    fn test_copy_default_destination_and_replace() {
        let f = fixture();
        let manager = manager(&f);
        let record = create(&manager, &f);

        let first = manager.copy(&record.id, None).unwrap();
        assert_eq!(first.destination, f.dir.path().join("extracted").join(&record.id));
        assert!(first.destination.join("model/crate_simplify.obj").is_file());
        assert_eq!(first.files_copied, 6);

        fs::write(first.destination.join("stray.txt"), "x").unwrap();
        let again = manager.copy(&record.id, None).unwrap();
        assert!(!again.destination.join("stray.txt").exists());

        let custom = f.dir.path().join("elsewhere");
        assert_eq!(manager.copy(&record.id, Some(&custom)).unwrap().destination, custom);
    }

    #[test]
    fn test_copy_not_found() {
        let f = fixture();
        let manager = manager(&f);
        for id in ["missing", "../src", "a/b", ""] {
            assert!(matches!(manager.copy(id, None), Err(ArchiveError::NotFound { .. })), "{id}");
        }
    }

    #[test]
    fn test_info() {
        let f = fixture();
        let manager = manager(&f);
        let empty = manager.info().unwrap();
        assert!(!empty.exists);
        assert_eq!(empty.total_archives, 0);
        assert!(empty.oldest.is_none());

        let a = create(&manager, &f);
        backdate(&a, 2);
        create(&manager, &f);
        let info = manager.info().unwrap();
        assert!(info.exists);
        assert_eq!(info.total_archives, 2);
        assert!(info.oldest < info.newest);
    }
}
