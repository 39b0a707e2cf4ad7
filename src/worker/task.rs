//! One attempt at converting a work item.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use crate::core::WorkItem;
use crate::processing::batch::ArchiveAssembly;
use crate::processing::{Pipeline, codec};
use crate::utils::{PressError, PressResult, write_atomic};

/// Where the source bytes come from.
#[derive(Debug, Clone)]
pub enum ItemInput {
    /// Read from disk on every attempt
    File(PathBuf),
    /// Already extracted from an archive
    Bytes(Arc<Vec<u8>>),
}

/// Where the converted page goes.
#[derive(Debug, Clone)]
pub enum ItemOutput {
    /// Written straight to this path
    File(PathBuf),
    /// Slotted into the archive buffer
    Archive(Arc<ArchiveAssembly>),
}

/// What a successful attempt produced.
#[derive(Debug)]
pub enum Produced {
    Written { bytes_in: u64, bytes_out: u64 },
    Encoded { bytes_in: u64, data: Vec<u8> },
}

/// A work item bound to its input and output.
#[derive(Debug, Clone)]
pub struct ImageTask {
    pub item: WorkItem,
    pub input: ItemInput,
    pub output: ItemOutput,
}

impl ImageTask {
    pub fn loose(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            item: WorkItem::loose(source.clone()),
            input: ItemInput::File(source),
            output: ItemOutput::File(destination),
        }
    }

    pub fn member(item: WorkItem, data: Vec<u8>, assembly: Arc<ArchiveAssembly>) -> Self {
        Self {
            item,
            input: ItemInput::Bytes(Arc::new(data)),
            output: ItemOutput::Archive(assembly),
        }
    }

    /// Read, decode, run the pipeline, encode and (for loose images) write.
    ///
    /// Decoding and the pipeline run on the blocking pool; nothing is written
    /// unless every stage succeeded.
    pub async fn attempt(&self, pipeline: Arc<Pipeline>, quality: u8) -> PressResult<Produced> {
        let data = match &self.input {
            ItemInput::File(path) => Arc::new(fs::read(path).await.map_err(|e| PressError::io(path, e))?),
            ItemInput::Bytes(bytes) => Arc::clone(bytes),
        };
        let bytes_in = data.len() as u64;
        let origin = self.item.display_path();

        let encoded = tokio::task::spawn_blocking(move || -> PressResult<Vec<u8>> {
            let image = codec::decode(&data, &origin)?;
            let image = pipeline.process(image)?;
            codec::encode_png(&image, quality, &origin)
        })
        .await??;

        match &self.output {
            ItemOutput::File(destination) => {
                write_atomic(destination, &encoded).await?;
                Ok(Produced::Written {
                    bytes_in,
                    bytes_out: encoded.len() as u64,
                })
            }
            ItemOutput::Archive(_) => Ok(Produced::Encoded { bytes_in, data: encoded }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use image::{DynamicImage, GrayImage, Luma};
    use crate::processing::Step;
    use crate::utils::TransformError;

    fn write_png(path: &std::path::Path) {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([128]))).save(path).unwrap();
    }

    #[tokio::test]
    async fn writes_loose_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        let dest = dir.path().join("out/in.png");
        write_png(&src);

        let task = ImageTask::loose(src, dest.clone());
        let produced = task.attempt(Arc::new(Pipeline::new()), 6).await.unwrap();
        assert!(matches!(produced, Produced::Written { .. }));
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn failed_transform_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        let dest = dir.path().join("out/in.png");
        write_png(&src);

        let failing = Step::custom("fail", BTreeMap::new(), |_| Err(TransformError::transient("busy")));
        let task = ImageTask::loose(src, dest.clone());
        let err = task
            .attempt(Arc::new(Pipeline::from_steps(vec![failing])), 6)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn missing_input_is_transient_io() {
        let dir = tempfile::tempdir().unwrap();
        let task = ImageTask::loose(dir.path().join("gone.png"), dir.path().join("out.png"));
        let err = task.attempt(Arc::new(Pipeline::new()), 6).await.unwrap_err();
        assert!(matches!(err, PressError::Io { .. }));
    }
}
