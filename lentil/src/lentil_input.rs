use crate::lentil_common::*;

use candle_core::{DType, Device, Tensor};
use candle_util::candle_conv_modules::IMAGE_SIZE;
use std::io::Read;
use std::path::{Path, PathBuf};

const IDX_UBYTE: u8 = 0x08;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn prefix(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "t10k",
        }
    }
}

/// How each image is laid out in the input tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageLayout {
    /// (n, h * w) for the dense models
    Flat,
    /// (n, 1, 32, 32), zero-padded, for the conv models
    Padded,
}

pub struct ImageDataset {
    /// pixels in [0, 1]
    pub images: Tensor,
    /// integer labels (n), `u32`
    pub labels: Tensor,
    pub n_classes: usize,
}

impl ImageDataset {
    pub fn num_samples(&self) -> usize {
        self.images.dims().first().cloned().unwrap_or(0)
    }
}

/// An IDX array: dimensions and raw unsigned bytes
pub struct IdxArray {
    pub dims: Vec<usize>,
    pub data: Vec<u8>,
}

///
/// Read an IDX file (`.gz` or not) of unsigned bytes
///
pub fn read_idx(file: &Path) -> anyhow::Result<IdxArray> {
    let mut reader = open_buf_reader(file)?;

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic[0] != 0 || magic[1] != 0 {
        return Err(anyhow::anyhow!("{}: not an IDX file", file.display()));
    }
    if magic[2] != IDX_UBYTE {
        return Err(anyhow::anyhow!(
            "{}: only unsigned byte IDX is supported (type {:#04x})",
            file.display(),
            magic[2]
        ));
    }

    let ndim = magic[3] as usize;
    let mut dims = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        dims.push(u32::from_be_bytes(buf) as usize);
    }

    let ntot: usize = dims.iter().product();
    let mut data = Vec::with_capacity(ntot);
    reader.read_to_end(&mut data)?;
    if data.len() != ntot {
        return Err(anyhow::anyhow!(
            "{}: expected {} bytes for {:?}, found {}",
            file.display(),
            ntot,
            dims,
            data.len()
        ));
    }

    Ok(IdxArray { dims, data })
}

/// `<dir>/<name>` or `<dir>/<name>.gz`, whichever exists
fn find_idx_file(data_dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let plain = data_dir.join(name);
    if plain.exists() {
        return Ok(plain);
    }
    let gz = data_dir.join(format!("{}.gz", name));
    if gz.exists() {
        return Ok(gz);
    }
    Err(anyhow::anyhow!(
        "couldn't find {} (or .gz) under {}",
        name,
        data_dir.display()
    ))
}

///
/// Load MNIST images and labels into memory
///
/// * `data_dir` - directory with `{train,t10k}-{images-idx3,labels-idx1}-ubyte[.gz]`
/// * `split` - train or test
/// * `layout` - flat vectors or padded 32 x 32 images
///
pub fn load_mnist(data_dir: &Path, split: Split, layout: ImageLayout) -> anyhow::Result<ImageDataset> {
    let image_file = find_idx_file(data_dir, &format!("{}-images-idx3-ubyte", split.prefix()))?;
    let label_file = find_idx_file(data_dir, &format!("{}-labels-idx1-ubyte", split.prefix()))?;

    let images = read_idx(&image_file)?;
    let labels = read_idx(&label_file)?;

    info!("Read {:?} images from {}", images.dims, image_file.display());

    images_to_dataset(images, labels, MNIST_CLASSES, layout)
}

/// Normalize to [0, 1] and arrange `images` in the requested `layout`
pub fn images_to_dataset(
    images: IdxArray,
    labels: IdxArray,
    n_classes: usize,
    layout: ImageLayout,
) -> anyhow::Result<ImageDataset> {
    let (n, h, w) = match images.dims.as_slice() {
        [n, h, w] => (*n, *h, *w),
        _ => return Err(anyhow::anyhow!("images must be 3-d, got {:?}", images.dims)),
    };

    if labels.dims != [n] {
        return Err(anyhow::anyhow!(
            "{} images but labels of shape {:?}",
            n,
            labels.dims
        ));
    }

    if let Some(&bad) = labels.data.iter().find(|&&y| y as usize >= n_classes) {
        return Err(anyhow::anyhow!("label {} outside of {} classes", bad, n_classes));
    }

    let dev = Device::Cpu;
    let pixels = Tensor::from_vec(images.data, (n, h, w), &dev)?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?;

    let images = match layout {
        ImageLayout::Flat => pixels.reshape((n, h * w))?,
        ImageLayout::Padded => {
            if h > IMAGE_SIZE || w > IMAGE_SIZE {
                return Err(anyhow::anyhow!(
                    "{} x {} images don't fit in {} x {}",
                    h,
                    w,
                    IMAGE_SIZE,
                    IMAGE_SIZE
                ));
            }
            let (top, left) = ((IMAGE_SIZE - h) / 2, (IMAGE_SIZE - w) / 2);
            pixels
                .reshape((n, 1, h, w))?
                .pad_with_zeros(2, top, IMAGE_SIZE - h - top)?
                .pad_with_zeros(3, left, IMAGE_SIZE - w - left)?
        }
    };

    let labels = Tensor::from_vec(
        labels.data.iter().map(|&y| y as u32).collect::<Vec<_>>(),
        n,
        &dev,
    )?;

    Ok(ImageDataset {
        images,
        labels,
        n_classes,
    })
}
