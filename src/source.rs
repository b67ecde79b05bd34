//! Where class bytes come from.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jclassfile::class_file;
use regex::Regex;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::classfile::resolve_class_name;
use crate::error::MutationError;

/// Read-only lookup of class bytes by internal name.
pub trait ClassByteSource: Send + Sync {
    /// Bytes of `name` (dotted or slash form), or `None` if it is not here.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// `com.example.Foo`, `com/example/Foo` and `com/example/Foo.class` all
/// become `com/example/Foo`.
pub fn internal_name(name: &str) -> String {
    name.strip_suffix(".class").unwrap_or(name).replace('.', "/")
}

/// Classes laid out as `.class` files under a root directory.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ClassByteSource for DirectorySource {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(format!("{}.class", internal_name(name)));
        if !path.is_file() {
            return Ok(None);
        }
        let data = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(data))
    }
}

/// Classes inside a jar. The archive is opened for every read.
#[derive(Clone, Debug)]
pub struct JarSource {
    path: PathBuf,
}

impl JarSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClassByteSource for JarSource {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let file = fs::File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let entry_name = format!("{}.class", internal_name(name));
        let mut entry = match archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read {}:{}", self.path.display(), entry_name)
                });
            }
        };
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", self.path.display(), entry_name))?;
        Ok(Some(data))
    }
}

/// In-memory classes, mostly for tests and single class files.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    classes: BTreeMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(internal_name(name), bytes);
    }
}

impl ClassByteSource for MemorySource {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.classes.get(&internal_name(name)).cloned())
    }
}

/// Ordered list of sources; the first one that has a class wins.
#[derive(Default)]
pub struct ClasspathSource {
    sources: Vec<Box<dyn ClassByteSource>>,
}

impl ClasspathSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Box<dyn ClassByteSource>) {
        self.sources.push(source);
    }

    /// Open the input followed by the classpath entries in sorted order.
    pub fn open(input: &Path, classpath: &[PathBuf]) -> Result<Self> {
        let mut sources = Self::new();
        sources.push(source_for(input)?);
        let mut entries = classpath.to_vec();
        entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));
        for entry in entries {
            sources.push(source_for(&entry)?);
        }
        Ok(sources)
    }
}

impl ClassByteSource for ClasspathSource {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for source in &self.sources {
            if let Some(data) = source.read(name)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}

/// Source for a directory, a jar, or a single class file.
pub fn source_for(path: &Path) -> Result<Box<dyn ClassByteSource>> {
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::new(path)));
    }
    match extension(path) {
        "jar" => Ok(Box::new(JarSource::new(path))),
        "class" => {
            let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let name = class_name(&data).with_context(|| format!("failed to parse {}", path.display()))?;
            let mut memory = MemorySource::new();
            memory.insert(&name, data);
            Ok(Box::new(memory))
        }
        _ => anyhow::bail!("unsupported input file: {}", path.display()),
    }
}

/// Internal names of every class under `path`, sorted.
pub fn list_classes(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if path.is_dir() {
        list_dir(path, path, &mut names)?;
    } else {
        match extension(path) {
            "class" => {
                let data =
                    fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
                names.push(
                    class_name(&data).with_context(|| format!("failed to parse {}", path.display()))?,
                );
            }
            "jar" => list_jar(path, &mut names)?,
            _ => anyhow::bail!("unsupported input file: {}", path.display()),
        }
    }
    names.sort();
    Ok(names)
}

fn list_dir(root: &Path, path: &Path, names: &mut Vec<String>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }
    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            list_dir(root, &entry, names)?;
        } else if extension(&entry) == "class" {
            let relative = entry
                .strip_prefix(root)
                .with_context(|| format!("{} escapes {}", entry.display(), root.display()))?;
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if is_class_entry(&name) {
                names.push(internal_name(&name));
            }
        }
    }
    Ok(())
}

fn list_jar(path: &Path, names: &mut Vec<String>) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && is_class_entry(&name) {
            names.push(internal_name(&name));
        }
    }
    Ok(())
}

fn is_class_entry(name: &str) -> bool {
    !name.ends_with("module-info.class") && !name.ends_with("package-info.class")
}

fn class_name(data: &[u8]) -> Result<String> {
    let class = class_file::parse(data)?;
    resolve_class_name(class.constant_pool(), class.this_class())
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Include/exclude regexes over dotted class names.
#[derive(Clone, Debug, Default)]
pub struct ClassFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ClassFilter {
    pub fn new(include: &[String], exclude: &[String]) -> crate::error::Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|err| MutationError::invalid_pattern(pattern, &err))
                })
                .collect::<crate::error::Result<Vec<_>>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// With no include patterns every class not excluded matches.
    pub fn matches(&self, name: &str) -> bool {
        let dotted = internal_name(name).replace('/', ".");
        let included =
            self.include.is_empty() || self.include.iter().any(|re| re.is_match(&dotted));
        included && !self.exclude.iter().any(|re| re.is_match(&dotted))
    }
}
