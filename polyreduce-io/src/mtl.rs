//! MTL material library support
//!
//! The library keeps its source text so texture references can be rewritten
//! in place without disturbing anything else in the file.

use crate::IoError;
use polyreduce_core::Result;
use std::path::Path;

/// Statements whose final token names a texture file (compared lowercase)
pub const TEXTURE_KEYWORDS: &[&str] = &[
    "map_kd", "map_ka", "map_ks", "map_ns", "map_bump", "bump", "map_d", "disp", "decal",
    "refl", "norm", "map_normal", "map_normalgl", "map_orm", "map_roughness", "map_metallic",
    "map_ao", "map_emissive", "map_ke", "map_opacity", "map_displacement", "map_height",
    "map_pr", "map_pm",
];

/// One texture statement such as `map_Kd -bm 1.0 textures/wood.png`
#[derive(Debug, Clone, PartialEq)]
pub struct TextureStatement {
    /// Keyword as written in the file
    pub keyword: String,
    /// Option tokens between the keyword and the path
    pub options: Vec<String>,
    /// Referenced path as written
    pub path: String,
    line: usize,
    path_offset: usize,
}

impl TextureStatement {
    /// Zero-based line number in the source text
    pub fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDef {
    pub name: String,
    pub textures: Vec<TextureStatement>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    lines: Vec<String>,
    pub materials: Vec<MaterialDef>,
}

impl MaterialLibrary {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
        let mut materials: Vec<MaterialDef> = Vec::new();

        for (line_no, raw) in lines.iter().enumerate() {
            let content = raw.trim_end();
            let mut tokens = content.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };
            let lower = keyword.to_ascii_lowercase();

            if lower == "newmtl" {
                let name = content
                    .trim_start()
                    .get(keyword.len()..)
                    .unwrap_or_default()
                    .trim();
                materials.push(MaterialDef {
                    name: name.to_string(),
                    textures: Vec::new(),
                });
                continue;
            }
            if !TEXTURE_KEYWORDS.contains(&lower.as_str()) {
                continue;
            }

            let rest: Vec<&str> = tokens.collect();
            let Some((path, options)) = rest.split_last() else {
                continue;
            };
            // Last token starts where the trimmed line minus the token length begins
            let path_offset = content.len() - path.len();

            let statement = TextureStatement {
                keyword: keyword.to_string(),
                options: options.iter().map(|s| s.to_string()).collect(),
                path: path.to_string(),
                line: line_no,
                path_offset,
            };
            match materials.last_mut() {
                Some(material) => material.textures.push(statement),
                None => materials.push(MaterialDef {
                    name: String::new(),
                    textures: vec![statement],
                }),
            }
        }

        Self { lines, materials }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => IoError::Io(e),
        })?;
        let library = Self::parse(&String::from_utf8_lossy(&bytes));
        tracing::debug!(
            path = %path.display(),
            materials = library.materials.len(),
            textures = library.textures().count(),
            "parsed MTL"
        );
        Ok(library)
    }

    /// All texture statements paired with their owning material
    pub fn textures(&self) -> impl Iterator<Item = (&MaterialDef, &TextureStatement)> {
        self.materials
            .iter()
            .flat_map(|m| m.textures.iter().map(move |t| (m, t)))
    }

    /// Source text with texture paths replaced where `replace` returns a new
    /// path. Every other byte of the file is kept as is.
    pub fn rewrite_paths<F>(&self, mut replace: F) -> String
    where
        F: FnMut(&TextureStatement) -> Option<String>,
    {
        let mut lines = self.lines.clone();
        for (_, statement) in self.textures() {
            if let Some(new_path) = replace(statement) {
                let line = &lines[statement.line];
                let start = statement.path_offset;
                let end = start + statement.path.len();
                lines[statement.line] = format!("{}{}{}", &line[..start], new_path, &line[end..]);
            }
        }
        lines.concat()
    }

    /// Unmodified source text
    pub fn source(&self) -> String {
        self.lines.concat()
    }
}
