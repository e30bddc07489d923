//! Per-job staging on disk.
//!
//! Each step takes explicit paths so it can run against temporary
//! directories in tests:
//! - [`resolve_template`] maps a root note to a provisioned template file
//! - [`Job::create`] makes `{work_dir}/{job_id}/Samples`
//! - [`persist_samples`] writes uploads verbatim into the samples directory
//! - [`copy_template`] copies the template into the job root
//! - [`write_archive`] zips the template and samples

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::TemplateMap;
use crate::types::{UploadedSample, is_plain_file_name};
use crate::{Error, Result};

/// Subdirectory holding samples, both in the job tree and in the archive.
pub const SAMPLES_DIR: &str = "Samples";

/// Resolve `root_note` to the template path inside `template_dir`.
///
/// Fails with [`Error::UnsupportedRootNote`] if the note is not mapped and
/// with [`Error::TemplateNotFound`] if the mapped file is not provisioned.
pub fn resolve_template(map: &TemplateMap, template_dir: &Path, root_note: &str) -> Result<PathBuf> {
    let template_name = map
        .template_for(root_note)
        .ok_or_else(|| Error::UnsupportedRootNote(root_note.to_string()))?;

    let path = template_dir.join(template_name);
    if !path.is_file() {
        return Err(Error::TemplateNotFound(template_name.to_string()));
    }
    Ok(path)
}

/// Archive filename for a job: `{instrument_name}_{root_note}_{job_id}.zip`.
pub fn archive_file_name(instrument_name: &str, root_note: &str, job_id: Uuid) -> String {
    format!("{instrument_name}_{root_note}_{job_id}.zip")
}

/// An isolated working directory for one packaging run.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    root: PathBuf,
    samples_dir: PathBuf,
}

impl Job {
    /// Create a fresh job tree under `work_dir`.
    ///
    /// The job root must not exist yet; with a v4 id a clash means something
    /// else is writing into the work directory.
    pub fn create(work_dir: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let root = work_dir.join(id.to_string());
        let samples_dir = root.join(SAMPLES_DIR);

        fs::create_dir(&root)?;
        fs::create_dir(&samples_dir)?;
        debug!(job_id = %id, root = %root.display(), "Created job directory");

        Ok(Self {
            id,
            root,
            samples_dir,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn samples_dir(&self) -> &Path {
        &self.samples_dir
    }
}

/// Write every sample unmodified to `samples_dir/{file_name}`.
///
/// A repeated filename overwrites the earlier upload. Returns the number of
/// distinct files on disk afterwards.
pub fn persist_samples(samples_dir: &Path, samples: &[UploadedSample]) -> Result<usize> {
    let mut seen = HashSet::new();

    for sample in samples {
        if !is_plain_file_name(&sample.file_name) {
            return Err(Error::InvalidRequest(format!(
                "Invalid sample filename: {:?}",
                sample.file_name
            )));
        }
        if !seen.insert(sample.file_name.as_str()) {
            warn!(file = %sample.file_name, "Duplicate sample filename, overwriting earlier upload");
        }

        fs::write(samples_dir.join(&sample.file_name), &sample.data)?;
        debug!(file = %sample.file_name, bytes = sample.data.len(), "Saved sample");
    }

    Ok(seen.len())
}

/// Copy `template` into `job_root` under the same filename.
pub fn copy_template(template: &Path, job_root: &Path) -> Result<PathBuf> {
    let name = file_name_of(template)?;
    let dest = job_root.join(name);
    fs::copy(template, &dest)?;
    Ok(dest)
}

/// Write a deflate zip at `dest` with `template` at the root and every file
/// in `samples_dir` under `Samples/`.
///
/// Sample entries come from the directory listing in name order, so the
/// archive reflects what is on disk rather than what was uploaded.
pub fn write_archive(template: &Path, samples_dir: &Path, dest: &Path) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(dest)?);

    zip.start_file(file_name_of(template)?, options)?;
    io::copy(&mut File::open(template)?, &mut zip)?;

    let mut samples = Vec::new();
    for entry in fs::read_dir(samples_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            samples.push(entry.path());
        }
    }
    samples.sort();

    for path in &samples {
        let name = file_name_of(path)?;
        zip.start_file(format!("{SAMPLES_DIR}/{name}"), options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }

    zip.finish()?;
    debug!(archive = %dest.display(), samples = samples.len(), "Wrote archive");
    Ok(())
}

fn file_name_of(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidRequest(format!("not a file path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use tempfile::tempdir;

    fn read_entries(archive: &Path) -> Vec<(String, Vec<u8>)> {
        let bytes = fs::read(archive).unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..zip.len())
            .map(|i| {
                let mut entry = zip.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn resolve_template_finds_provisioned_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Snare_C1.nki"), b"nki").unwrap();

        let path = resolve_template(&TemplateMap::default(), dir.path(), "C1").unwrap();
        assert_eq!(path, dir.path().join("Snare_C1.nki"));
    }

    #[test]
    fn resolve_template_unsupported_note() {
        let dir = tempdir().unwrap();
        let err = resolve_template(&TemplateMap::default(), dir.path(), "E7").unwrap_err();
        assert!(matches!(err, Error::UnsupportedRootNote(n) if n == "E7"));
    }

    #[test]
    fn resolve_template_missing_file() {
        let dir = tempdir().unwrap();
        let err = resolve_template(&TemplateMap::default(), dir.path(), "C3").unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(n) if n == "Snare_C3.nki"));
    }

    #[test]
    fn resolve_template_uses_custom_map() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Kick_E1.nki"), b"kick").unwrap();
        let map = TemplateMap::new([("E1", "Kick_E1.nki")]);

        assert!(resolve_template(&map, dir.path(), "E1").is_ok());
        assert!(matches!(
            resolve_template(&map, dir.path(), "C1"),
            Err(Error::UnsupportedRootNote(_))
        ));
    }

    #[test]
    fn job_create_makes_fresh_unique_trees() {
        let work = tempdir().unwrap();
        let a = Job::create(work.path()).unwrap();
        let b = Job::create(work.path()).unwrap();

        assert_ne!(a.id(), b.id());
        assert!(a.samples_dir().is_dir());
        assert_eq!(a.root(), work.path().join(a.id().to_string()));
        assert_eq!(a.samples_dir(), a.root().join(SAMPLES_DIR));
    }

    #[test]
    fn job_create_fails_without_work_dir() {
        let work = tempdir().unwrap();
        let err = Job::create(&work.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn persist_samples_writes_bytes_verbatim() {
        let dir = tempdir().unwrap();
        let samples = vec![
            UploadedSample::new("hit1.wav", b"RIFF1".to_vec()),
            UploadedSample::new("hit2.wav", b"RIFF2".to_vec()),
        ];

        assert_eq!(persist_samples(dir.path(), &samples).unwrap(), 2);
        assert_eq!(fs::read(dir.path().join("hit1.wav")).unwrap(), b"RIFF1");
        assert_eq!(fs::read(dir.path().join("hit2.wav")).unwrap(), b"RIFF2");
    }

    #[test]
    fn persist_samples_duplicate_name_keeps_last() {
        let dir = tempdir().unwrap();
        let samples = vec![
            UploadedSample::new("hit.wav", b"first".to_vec()),
            UploadedSample::new("hit.wav", b"second".to_vec()),
        ];

        assert_eq!(persist_samples(dir.path(), &samples).unwrap(), 1);
        assert_eq!(fs::read(dir.path().join("hit.wav")).unwrap(), b"second");
    }

    #[test]
    fn persist_samples_rejects_path_components() {
        let dir = tempdir().unwrap();
        let samples = vec![UploadedSample::new("../escape.wav", b"x".to_vec())];
        let err = persist_samples(dir.path(), &samples).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(!dir.path().parent().unwrap().join("escape.wav").exists());
    }

    #[test]
    fn copy_template_is_byte_identical() {
        let store = tempdir().unwrap();
        let job = tempdir().unwrap();
        let template = store.path().join("Snare_C0.nki");
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        fs::write(&template, &content).unwrap();

        let copied = copy_template(&template, job.path()).unwrap();
        assert_eq!(copied, job.path().join("Snare_C0.nki"));
        assert_eq!(fs::read(&copied).unwrap(), content);
        assert_eq!(fs::read(&template).unwrap(), content);
    }

    #[test]
    fn write_archive_layout() {
        let work = tempdir().unwrap();
        let job = Job::create(work.path()).unwrap();
        fs::write(job.root().join("Snare_C1.nki"), b"template").unwrap();
        fs::write(job.samples_dir().join("b.wav"), b"bbb").unwrap();
        fs::write(job.samples_dir().join("a.wav"), b"aaa").unwrap();

        let dest = work.path().join("Snare_C1_test.zip");
        write_archive(&job.root().join("Snare_C1.nki"), job.samples_dir(), &dest).unwrap();

        let entries = read_entries(&dest);
        assert_eq!(
            entries,
            vec![
                ("Snare_C1.nki".to_string(), b"template".to_vec()),
                ("Samples/a.wav".to_string(), b"aaa".to_vec()),
                ("Samples/b.wav".to_string(), b"bbb".to_vec()),
            ]
        );
    }

    #[test]
    fn write_archive_uses_deflate() {
        let work = tempdir().unwrap();
        let job = Job::create(work.path()).unwrap();
        let template = job.root().join("t.nki");
        fs::write(&template, vec![0u8; 10_000]).unwrap();
        fs::write(job.samples_dir().join("s.wav"), vec![1u8; 10_000]).unwrap();

        let dest = work.path().join("out.zip");
        write_archive(&template, job.samples_dir(), &dest).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        for i in 0..zip.len() {
            let entry = zip.by_index(i).unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Deflated);
            assert!(entry.compressed_size() < entry.size());
        }
    }

    #[test]
    fn archive_file_name_format() {
        let id = Uuid::nil();
        assert_eq!(
            archive_file_name("Snare", "C1", id),
            "Snare_C1_00000000-0000-0000-0000-000000000000.zip"
        );
    }
}
