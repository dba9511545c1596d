//! `archive#http` - archives fetched over HTTP(S) and unpacked in place

use anyhow::{Context, Result};
use base64::Engine;
use declarative::kinds::archive::{ArchiveProperties, ArchiveProvider};
use declarative::state::ArchiveMetadata;
use declarative::{
    CommandRunner, ENSURE_ABSENT, ENSURE_PRESENT, Facts, Logger, Provider, ProviderFactory,
    ProviderInstance, ResourceProperties, ResourceState,
};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use super::posix;

pub const NAME: &str = "http";

const USER_AGENT: &str = concat!("converge/", env!("CARGO_PKG_VERSION"));

pub struct HttpArchiveFactory;

impl ProviderFactory for HttpArchiveFactory {
    fn type_name(&self) -> &str {
        declarative::kinds::archive::TYPE_NAME
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
        Ok(ProviderInstance::Archive(Box::new(HttpArchive { logger })))
    }
}

pub struct HttpArchive {
    logger: Logger,
}

impl Provider for HttpArchive {
    fn name(&self) -> &str {
        NAME
    }
}

fn file_checksum(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn basic_auth(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

/// Copy a body into `out`, returning the sha256 of what was written
fn copy_hashed(reader: &mut impl Read, out: &mut impl Write) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read response body"),
        };
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_zip(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".zip")
}

impl HttpArchive {
    fn extract_targz(&self, archive: &Path, into: &Path, ids: (u32, u32)) -> Result<()> {
        let decoder = flate2::read::GzDecoder::new(File::open(archive)?);
        let mut tarball = tar::Archive::new(decoder);
        tarball.set_preserve_permissions(true);

        for entry in tarball.entries()? {
            let mut entry = entry?;
            let relative = entry.path()?.into_owned();
            if !entry.unpack_in(into)? {
                self.logger
                    .warn(format_args!("Skipped unsafe entry {}", relative.display()));
                continue;
            }
            posix::chown_ids(&into.join(&relative), ids.0, ids.1)?;
        }
        Ok(())
    }

    fn extract_zip(&self, archive: &Path, into: &Path, ids: (u32, u32)) -> Result<()> {
        let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
        zip.extract(into)
            .with_context(|| format!("Could not extract {}", archive.display()))?;

        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if let Some(relative) = file.enclosed_name() {
                posix::chown_ids(&into.join(relative), ids.0, ids.1)?;
            }
        }
        Ok(())
    }
}

impl ArchiveProvider for HttpArchive {
    fn status(&self, properties: &ArchiveProperties) -> Result<ResourceState<ArchiveMetadata>> {
        let path = Path::new(&properties.common.name);
        let creates_exists = properties
            .creates
            .as_deref()
            .is_some_and(|p| Path::new(p).exists());

        let meta = match fs::metadata(path) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e).with_context(|| format!("Could not stat {}", path.display())),
        };

        let Some(meta) = meta else {
            return Ok(ResourceState::new(
                ENSURE_ABSENT,
                ArchiveMetadata {
                    name: properties.common.name.clone(),
                    exists: false,
                    size: 0,
                    checksum: None,
                    owner: None,
                    group: None,
                    uid: None,
                    gid: None,
                    creates_exists,
                },
            ));
        };

        let checksum = match properties.checksum {
            Some(_) => Some(file_checksum(path)?),
            None => None,
        };
        let (owner, group) = posix::ownership(&meta);
        Ok(ResourceState::new(
            ENSURE_PRESENT,
            ArchiveMetadata {
                name: properties.common.name.clone(),
                exists: true,
                size: meta.len(),
                checksum,
                owner: Some(owner),
                group: Some(group),
                uid: Some(meta.uid()),
                gid: Some(meta.gid()),
                creates_exists,
            },
        ))
    }

    fn download(&self, properties: &ArchiveProperties) -> Result<()> {
        let path = Path::new(&properties.common.name);
        let dir = path.parent().context("archive path has no parent directory")?;
        fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))?;
        let (uid, gid) = posix::ids(&properties.owner, &properties.group)?;

        self.logger.info(format_args!("Downloading {}", properties.url));
        let agent = ureq::Agent::new_with_defaults();
        let mut request = agent.get(&properties.url).header("User-Agent", USER_AGENT);
        for (name, value) in &properties.headers {
            request = request.header(name, value);
        }
        if let (Some(user), Some(password)) = (&properties.username, &properties.password) {
            request = request.header("Authorization", basic_auth(user, password));
        }
        let mut response = request
            .call()
            .with_context(|| format!("Failed to download {}", properties.url))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Could not create temporary file in {}", dir.display()))?;
        let actual = copy_hashed(&mut response.body_mut().as_reader(), &mut tmp)?;

        if let Some(expected) = &properties.checksum
            && !expected.eq_ignore_ascii_case(&actual)
        {
            return Err(declarative::Error::ChecksumMismatch {
                expected: expected.clone(),
                actual,
            }
            .into());
        }

        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
        tmp.persist(path)
            .with_context(|| format!("Could not write {}", path.display()))?;
        posix::chown_ids(path, uid, gid)
    }

    fn extract(&self, properties: &ArchiveProperties) -> Result<()> {
        let Some(parent) = properties.extract_parent.as_deref() else {
            return Ok(());
        };
        let archive = Path::new(&properties.common.name);
        let into = Path::new(parent);
        fs::create_dir_all(into).with_context(|| format!("Could not create {parent}"))?;
        let ids = posix::ids(&properties.owner, &properties.group)?;

        self.logger
            .info(format_args!("Extracting {} into {parent}", archive.display()));
        if is_zip(archive) {
            self.extract_zip(archive, into, ids)
        } else {
            self.extract_targz(archive, into, ids)
        }
    }

    fn set_ownership(&self, properties: &ArchiveProperties) -> Result<()> {
        let path = Path::new(&properties.common.name);
        self.logger.info(format_args!(
            "Changing ownership of {} to {}:{}",
            path.display(),
            properties.owner,
            properties.group
        ));
        posix::chown(path, &properties.owner, &properties.group)
    }

    fn remove(&self, properties: &ArchiveProperties) -> Result<()> {
        let path = Path::new(&properties.common.name);
        match fs::remove_file(path) {
            Ok(()) => {
                self.logger.info(format_args!("Removed {}", path.display()));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Could not remove {}", path.display())),
        }
    }
}
