//! Material and texture resolution
//!
//! Resolves the material library a mesh declares, classifies its texture
//! references, and rewrites them when the files move.

use crate::issue::{Issue, IssueKind};
use polyreduce_core::TriangleMesh;
use polyreduce_io::{mtllib_names, MaterialLibrary};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Image extensions accepted as textures (compared lowercase)
pub const TEXTURE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "tga", "tiff", "tif", "dds", "hdr", "exr", "webp", "ktx", "ktx2",
    "basis", "psd", "targa", "sgi", "pic", "iff", "ppm", "pgm", "pbm",
];

/// File name words that mark an image as something other than a texture
const NON_TEXTURE_WORDS: &[&str] = &[
    "screenshot", "capture", "icon", "logo", "banner", "thumb", "preview", "ui", "gui", "button",
    "menu", "cursor", "font",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureRole {
    Diffuse,
    Normal,
    Specular,
    Other,
}

/// One texture reference from a material library
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureRef {
    pub material: String,
    /// Statement keyword, e.g. `map_Kd`
    pub slot: String,
    /// Path as written in the library
    pub reference: String,
    pub role: TextureRole,
    /// Existing file the reference points at
    pub resolved: Option<PathBuf>,
    /// Zero-based line in the library
    pub line: usize,
}

/// Materials of one mesh and the files backing them
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterialSet {
    /// Resolved material library file
    pub library: Option<PathBuf>,
    /// Library name as declared by the mesh
    pub declared_library: Option<String>,
    pub materials: BTreeMap<String, Vec<TextureRef>>,
    pub issues: Vec<Issue>,
    #[serde(skip)]
    source: Option<MaterialLibrary>,
}

impl MaterialSet {
    pub fn textures(&self) -> impl Iterator<Item = &TextureRef> {
        self.materials.values().flatten()
    }

    /// Resolved texture files, each listed once
    pub fn texture_files(&self) -> Vec<&Path> {
        let mut seen = HashSet::new();
        self.textures()
            .filter_map(|t| t.resolved.as_deref())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Resolved texture files paired with a file name that is unique within
    /// one flat directory. Distinct files sharing a name get `_1`, `_2`, ...
    pub fn flattened_textures(&self) -> Vec<(&Path, String)> {
        let mut taken = HashSet::new();
        self.texture_files()
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let unique = unique_file_name(&name, &mut taken);
                if unique != name {
                    debug!(texture = %path.display(), renamed = %unique, "texture name already taken");
                }
                Some((path, unique))
            })
            .collect()
    }

    pub fn missing(&self) -> impl Iterator<Item = &TextureRef> {
        self.textures().filter(|t| t.resolved.is_none())
    }

    /// Library text with every resolved texture re-pointed at `place(texture)`,
    /// expressed relative to `library_dir`. `None` without a library.
    pub fn rewrite<F>(&self, library_dir: &Path, mut place: F) -> Option<String>
    where
        F: FnMut(&TextureRef) -> Option<PathBuf>,
    {
        let source = self.source.as_ref()?;
        let by_line: HashMap<usize, &TextureRef> = self.textures().map(|t| (t.line, t)).collect();
        Some(source.rewrite_paths(|statement| {
            let texture = by_line.get(&statement.line())?;
            let target = place(texture)?;
            Some(relative_path(library_dir, &target))
        }))
    }
}

pub struct MaterialResolver;

impl MaterialResolver {
    /// Resolve the material library declared by `mesh`, loaded from `model_path`
    ///
    /// Meshes that declare nothing fall back to `<stem>.mtl` beside the model.
    pub fn resolve(mesh: &TriangleMesh, model_path: &Path) -> MaterialSet {
        let base_dir = parent_dir(model_path);
        if mesh.material_libs.len() > 1 {
            debug!(libraries = ?mesh.material_libs, "only the first material library is resolved");
        }

        let Some(declared) = mesh.material_libs.first() else {
            let sibling = model_path.with_extension("mtl");
            return if sibling.is_file() {
                Self::resolve_library(&sibling)
            } else {
                MaterialSet::default()
            };
        };

        match locate(base_dir, declared) {
            Some(path) => {
                let mut set = Self::resolve_library(&path);
                set.declared_library = Some(declared.clone());
                set
            }
            None => {
                warn!(library = %declared, "material library not found");
                MaterialSet {
                    declared_library: Some(declared.clone()),
                    issues: vec![Issue::warning(
                        IssueKind::MissingMaterialLibrary,
                        format!("material library '{declared}' not found"),
                    )
                    .with_location(base_dir.display().to_string())],
                    ..MaterialSet::default()
                }
            }
        }
    }

    /// Load a library file and resolve its textures against its directory
    pub fn resolve_library(path: &Path) -> MaterialSet {
        let library = match MaterialLibrary::read(path) {
            Ok(library) => library,
            Err(e) => {
                return MaterialSet {
                    issues: vec![Issue::warning(
                        IssueKind::MissingMaterialLibrary,
                        format!("material library could not be read: {e}"),
                    )
                    .with_location(path.display().to_string())],
                    ..MaterialSet::default()
                }
            }
        };

        let dir = parent_dir(path);
        let mut materials: BTreeMap<String, Vec<TextureRef>> = BTreeMap::new();
        let mut issues = Vec::new();
        for material in &library.materials {
            materials.entry(material.name.clone()).or_default();
        }
        for (material, statement) in library.textures() {
            let resolved = locate(dir, &statement.path);
            if resolved.is_none() {
                issues.push(
                    Issue::warning(
                        IssueKind::MissingTexture,
                        format!("texture '{}' not found", statement.path),
                    )
                    .with_location(format!("{}/{}", material.name, statement.keyword)),
                );
            }
            materials.entry(material.name.clone()).or_default().push(TextureRef {
                material: material.name.clone(),
                slot: statement.keyword.clone(),
                reference: statement.path.clone(),
                role: Self::classify(&statement.keyword, &statement.path),
                resolved,
                line: statement.line(),
            });
        }

        debug!(
            library = %path.display(),
            materials = materials.len(),
            missing = issues.len(),
            "material library resolved"
        );
        MaterialSet {
            library: Some(path.to_path_buf()),
            declared_library: None,
            materials,
            issues,
            source: Some(library),
        }
    }

    /// Texture role from the statement keyword, then from the file name
    pub fn classify(slot: &str, reference: &str) -> TextureRole {
        match slot.to_ascii_lowercase().as_str() {
            "map_kd" => return TextureRole::Diffuse,
            "map_bump" | "bump" | "norm" | "map_normal" | "map_normalgl" => return TextureRole::Normal,
            "map_ks" | "map_ns" | "map_roughness" | "map_metallic" => return TextureRole::Specular,
            _ => {}
        }

        let name = file_name(reference).to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| name.contains(w));
        if has(&["normal", "nrm", "norm"]) {
            TextureRole::Normal
        } else if has(&["diffuse", "albedo", "basecolor", "base_color", "color", "col"]) {
            TextureRole::Diffuse
        } else if has(&["spec", "rough", "gloss", "metal"]) {
            TextureRole::Specular
        } else {
            TextureRole::Other
        }
    }
}

/// Whether a file name looks like a texture image
///
/// The extension must be an image format, and no word of the stem (split on
/// non-alphanumerics) may name UI artwork such as icons or screenshots.
pub fn is_texture_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let path = Path::new(&lower);
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if !TEXTURE_EXTENSIONS.contains(&ext) {
        return false;
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    !stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|word| {
            NON_TEXTURE_WORDS
                .iter()
                .any(|bad| word == *bad || (bad.len() >= 4 && word.starts_with(bad)))
        })
}

/// Find the file a reference points at, relative to `base_dir`
///
/// Tries the reference as written (with `\` normalised), then its bare file
/// name. Absolute references are only checked as written.
pub fn locate(base_dir: &Path, reference: &str) -> Option<PathBuf> {
    let normalized = reference.trim().replace('\\', "/");
    if normalized.is_empty() {
        return None;
    }
    let as_written = Path::new(&normalized);
    if as_written.is_absolute() {
        return as_written.is_file().then(|| as_written.to_path_buf());
    }
    let direct = base_dir.join(as_written);
    if direct.is_file() {
        return Some(direct);
    }
    let by_name = base_dir.join(file_name(&normalized));
    by_name.is_file().then_some(by_name)
}

/// `/`-separated path from directory `from_dir` to `to`
pub fn relative_path(from_dir: &Path, to: &Path) -> String {
    let from = absolute(from_dir);
    let to = absolute(to);
    let from_parts: Vec<Component> = from.components().collect();
    let to_parts: Vec<Component> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return to.to_string_lossy().replace('\\', "/");
    }

    let ups = std::iter::repeat("..".to_string()).take(from_parts.len() - common);
    let downs = to_parts[common..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    ups.chain(downs).collect::<Vec<_>>().join("/")
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn file_name(reference: &str) -> &str {
    reference.rsplit(['/', '\\']).next().unwrap_or(reference)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// `name`, or `name` with a numeric suffix before the extension, whichever is
/// not yet in `taken` (compared case-insensitively)
fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_lowercase()) {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..)
        .map(|n| format!("{stem}_{n}{extension}"))
        .find(|candidate| taken.insert(candidate.to_lowercase()))
        .unwrap_or_else(|| name.to_string())
}

/// `mtllib` names declared by an OBJ file, without decoding its geometry
pub fn declared_libraries(obj_path: &Path) -> std::io::Result<Vec<String>> {
    let file = fs::File::open(obj_path)?;
    let mut libraries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Some((keyword, rest)) = line.trim().split_once(char::is_whitespace) {
            if keyword.eq_ignore_ascii_case("mtllib") {
                libraries.extend(mtllib_names(rest));
            }
        }
    }
    Ok(libraries)
}

/// How one OBJ in a folder relates to the libraries and textures beside it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjRelationship {
    pub obj_file: String,
    pub referenced_mtl: Vec<String>,
    pub missing_mtl: Vec<String>,
    pub available_textures: Vec<String>,
    pub missing_textures: Vec<String>,
}

/// File inventory of a model folder
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FolderAnalysis {
    pub folder: PathBuf,
    pub obj_files: Vec<String>,
    pub mtl_files: Vec<String>,
    pub texture_files: Vec<String>,
    pub other_files: Vec<String>,
    pub relationships: Vec<ObjRelationship>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Classify the files directly inside `folder` and relate OBJs to their materials
pub fn analyze_folder(folder: &Path) -> std::io::Result<FolderAnalysis> {
    let mut analysis = FolderAnalysis {
        folder: folder.to_path_buf(),
        ..FolderAnalysis::default()
    };

    let mut names: Vec<String> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    for name in names {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".obj") {
            analysis.obj_files.push(name);
        } else if lower.ends_with(".mtl") {
            analysis.mtl_files.push(name);
        } else if is_texture_file(&name) {
            analysis.texture_files.push(name);
        } else {
            analysis.other_files.push(name);
        }
    }

    for obj in &analysis.obj_files {
        match relate_obj(&folder.join(obj)) {
            Ok(relationship) => analysis.relationships.push(relationship),
            Err(e) => analysis.errors.push(format!("failed to read OBJ file {obj}: {e}")),
        }
    }

    match analysis.obj_files.len() {
        0 => analysis.warnings.push("no OBJ files found in folder".to_string()),
        1 => {}
        _ => analysis
            .warnings
            .push(format!("multiple OBJ files found: {}", analysis.obj_files.join(", "))),
    }
    if analysis.mtl_files.is_empty() {
        analysis.warnings.push("no MTL files found in folder".to_string());
    }
    if analysis.texture_files.is_empty() {
        analysis.warnings.push("no texture files found in folder".to_string());
    }
    Ok(analysis)
}

fn relate_obj(obj_path: &Path) -> std::io::Result<ObjRelationship> {
    let dir = parent_dir(obj_path);
    let mut relationship = ObjRelationship {
        obj_file: obj_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ..ObjRelationship::default()
    };

    for declared in declared_libraries(obj_path)? {
        relationship.referenced_mtl.push(declared.clone());
        let Some(path) = locate(dir, &declared) else {
            relationship.missing_mtl.push(declared);
            continue;
        };
        let set = MaterialResolver::resolve_library(&path);
        for texture in set.textures() {
            let bucket = if texture.resolved.is_some() {
                &mut relationship.available_textures
            } else {
                &mut relationship.missing_textures
            };
            let name = file_name(&texture.reference).to_string();
            if !bucket.contains(&name) {
                bucket.push(name);
            }
        }
    }
    Ok(relationship)
}

/// Completeness check of one OBJ and its material files
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub exists: bool,
    pub valid: bool,
    pub referenced_mtl: Vec<String>,
    pub missing_mtl: Vec<String>,
    pub textures: Vec<PathBuf>,
    pub missing_textures: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

pub fn validate_model(obj_path: &Path) -> ValidationReport {
    let mut report = ValidationReport {
        path: obj_path.to_path_buf(),
        exists: obj_path.is_file(),
        ..ValidationReport::default()
    };
    if !report.exists {
        report.errors.push(format!("OBJ file not found: {}", obj_path.display()));
        return report;
    }

    let declared = match declared_libraries(obj_path) {
        Ok(declared) => declared,
        Err(e) => {
            report.errors.push(format!("failed to read OBJ file: {e}"));
            return report;
        }
    };

    let dir = parent_dir(obj_path);
    for library in declared {
        report.referenced_mtl.push(library.clone());
        let Some(path) = locate(dir, &library) else {
            report.missing_mtl.push(library);
            continue;
        };
        let set = MaterialResolver::resolve_library(&path);
        report.textures.extend(set.texture_files().into_iter().map(Path::to_path_buf));
        report
            .missing_textures
            .extend(set.missing().map(|t| t.reference.clone()));
    }

    if report.referenced_mtl.is_empty() {
        report.warnings.push("OBJ declares no material library".to_string());
    }
    for missing in &report.missing_mtl {
        report.warnings.push(format!("material library not found: {missing}"));
    }
    for missing in &report.missing_textures {
        report.warnings.push(format!("texture not found: {missing}"));
    }
    report.valid = report.errors.is_empty() && report.missing_mtl.is_empty();
    report
}
