//! `file#posix` - regular files and directories on the local filesystem

use anyhow::{Context, Result, bail};
use declarative::kinds::file::{
    ENSURE_DIRECTORY, FileProperties, FileProvider, parse_mode, sha256_hex,
};
use declarative::state::{FileKind, FileMetadata};
use declarative::{
    CommandRunner, ENSURE_ABSENT, ENSURE_PRESENT, Facts, Logger, Provider, ProviderFactory,
    ProviderInstance, ResourceProperties, ResourceState,
};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use super::posix;

pub const NAME: &str = "posix";

pub struct PosixFileFactory;

impl ProviderFactory for PosixFileFactory {
    fn type_name(&self) -> &str {
        declarative::kinds::file::TYPE_NAME
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_manageable(&self, _: &Facts, _: &ResourceProperties) -> Result<Option<i32>> {
        Ok(Some(10))
    }

    fn new_provider(
        &self,
        logger: Logger,
        _runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance> {
        Ok(ProviderInstance::File(Box::new(PosixFile { logger })))
    }
}

pub struct PosixFile {
    logger: Logger,
}

impl Provider for PosixFile {
    fn name(&self) -> &str {
        NAME
    }
}

fn missing(path: &str) -> ResourceState<FileMetadata> {
    ResourceState::new(
        ENSURE_ABSENT,
        FileMetadata {
            path: path.to_string(),
            kind: FileKind::Missing,
            owner: None,
            group: None,
            uid: None,
            gid: None,
            mode: None,
            checksum: None,
        },
    )
}

/// Write content through a temporary sibling so readers never see a partial file
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().context("file path has no parent directory")?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Could not create temporary file in {}", dir.display()))?;
    tmp.write_all(content)?;
    tmp.persist(path)
        .with_context(|| format!("Could not write {}", path.display()))?;
    Ok(())
}

impl FileProvider for PosixFile {
    fn status(&self, properties: &FileProperties) -> Result<ResourceState<FileMetadata>> {
        let path = &properties.common.name;
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(missing(path)),
            Err(e) => return Err(e).with_context(|| format!("Could not stat {path}")),
        };

        let (kind, ensure) = if meta.is_dir() {
            (FileKind::Directory, ENSURE_DIRECTORY)
        } else if meta.is_file() {
            (FileKind::File, ENSURE_PRESENT)
        } else {
            (FileKind::Other, "other")
        };

        // only hash when there is content to compare against
        let checksum = if kind == FileKind::File && properties.content.is_some() {
            let bytes = fs::read(path).with_context(|| format!("Could not read {path}"))?;
            Some(sha256_hex(&bytes))
        } else {
            None
        };

        let (owner, group) = posix::ownership(&meta);
        self.logger.debug(format_args!("{path} is {kind:?} owned by {owner}:{group}"));
        Ok(ResourceState::new(
            ensure,
            FileMetadata {
                path: path.clone(),
                kind,
                owner: Some(owner),
                group: Some(group),
                uid: Some(meta.uid()),
                gid: Some(meta.gid()),
                mode: Some(format!("{:04o}", meta.permissions().mode() & 0o7777)),
                checksum,
            },
        ))
    }

    fn store(&self, properties: &FileProperties) -> Result<()> {
        let path = Path::new(&properties.common.name);
        let existing = fs::symlink_metadata(path).ok();

        if properties.common.ensure == ENSURE_DIRECTORY {
            match existing {
                Some(meta) if !meta.is_dir() => {
                    bail!("{} exists and is not a directory", path.display());
                }
                Some(_) => {}
                None => {
                    self.logger.info(format_args!("Creating directory {}", path.display()));
                    fs::create_dir_all(path)
                        .with_context(|| format!("Could not create {}", path.display()))?;
                }
            }
        } else {
            if existing.as_ref().is_some_and(|m| !m.is_file()) {
                bail!("{} exists and is not a regular file", path.display());
            }
            match &properties.content {
                Some(content) => {
                    self.logger.info(format_args!("Writing {}", path.display()));
                    write_atomic(path, content.as_bytes())?;
                }
                None if existing.is_none() => {
                    self.logger.info(format_args!("Creating empty {}", path.display()));
                    write_atomic(path, b"")?;
                }
                None => {}
            }
        }

        posix::chown(path, &properties.owner, &properties.group)?;
        let mode = parse_mode(&properties.mode)?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Could not set mode of {}", path.display()))
    }

    fn remove(&self, properties: &FileProperties) -> Result<()> {
        let path = Path::new(&properties.common.name);
        let Ok(meta) = fs::symlink_metadata(path) else {
            return Ok(());
        };
        self.logger.info(format_args!("Removing {}", path.display()));
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
        .with_context(|| format!("Could not remove {}", path.display()))
    }
}
