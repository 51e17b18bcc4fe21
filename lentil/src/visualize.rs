use crate::arch::*;
use crate::lentil_common::*;
use crate::models::*;

use candle_core::{DType, Device, Tensor};
use image::{GrayImage, Luma};
use rand::Rng;
use statrs::distribution::{ContinuousCDF, Normal};
use std::path::{Path, PathBuf};

/// Latent samples laid out row by row on a `side x side` grid
pub struct LatentGrid {
    pub z: Tensor,
    pub cond: Option<Tensor>,
    pub side: usize,
}

/// `n` evenly spaced points of `[lb, ub]`
fn linspace(lb: f64, ub: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![lb; n];
    }
    let step = (ub - lb) / (n - 1) as f64;
    (0..n).map(|i| lb + step * i as f64).collect()
}

///
/// Standard normal quantiles of `n` evenly spaced probabilities in
/// `[0.01, 0.99]`
///
pub fn normal_quantile_grid(n: usize) -> anyhow::Result<Vec<f64>> {
    let normal = Normal::new(0.0, 1.0)?;
    Ok(linspace(0.01, 0.99, n)
        .into_iter()
        .map(|p| normal.inverse_cdf(p))
        .collect())
}

fn one_hot_rows(cols: &[usize], n_classes: usize, dev: &Device) -> anyhow::Result<Tensor> {
    let mut data = vec![0f32; cols.len() * n_classes];
    for (i, &c) in cols.iter().enumerate() {
        data[i * n_classes + (c % n_classes)] = 1.0;
    }
    Ok(Tensor::from_vec(data, (cols.len(), n_classes), dev)?)
}

/// label of each cell when labels change along columns
fn column_labels(side: usize) -> Vec<usize> {
    (0..side * side).map(|ij| ij % side).collect()
}

fn uniform_codes(n: usize, k: usize, dev: &Device) -> anyhow::Result<Tensor> {
    let mut rng = rand::rng();
    let data: Vec<f32> = (0..(n * k)).map(|_| rng.random::<f32>()).collect();
    Ok(Tensor::from_vec(data, (n, k), dev)?)
}

///
/// Latent codes (and labels) to decode into an image grid
///
/// * Gaussian dense VAE: quantile grid on the first two dimensions
/// * concrete VAE: uniform continuous part, category by column
/// * conditional VAE: digit 3 with the first two dimensions in [-1.5, 1.5]
/// * adversarial models: prior samples
/// * conv models: labels by column
///
pub fn latent_grid(arch: &Architecture, dev: &Device) -> anyhow::Result<LatentGrid> {
    let latent = arch.latent();
    let kk = latent.total();

    let grid = match arch {
        Architecture::Vae(_) => {
            let side = 15;
            let qq = normal_quantile_grid(side)?;
            let mut data = vec![0f32; side * side * kk];
            for i in 0..side {
                for j in 0..side {
                    let row = &mut data[(i * side + j) * kk..(i * side + j + 1) * kk];
                    row[0] = qq[j] as f32;
                    if kk > 1 {
                        row[1] = qq[i] as f32;
                    }
                }
            }
            LatentGrid {
                z: Tensor::from_vec(data, (side * side, kk), dev)?,
                cond: None,
                side,
            }
        }
        Architecture::ConcreteVae(_) => {
            let side = 15;
            let nn = side * side;
            let cont = uniform_codes(nn, latent.cont, dev)?;
            let z = if latent.disc > 0 {
                let disc = one_hot_rows(&column_labels(side), latent.disc, dev)?;
                Tensor::cat(&[&cont, &disc], 1)?
            } else {
                cont
            };
            LatentGrid { z, cond: None, side }
        }
        Architecture::ConditionalVae(p) => {
            let (side, digit, max_z) = (8, 3, 1.5);
            let sweep = linspace(-max_z, max_z, side);
            let mut data = vec![0f32; side * side * kk];
            for i in 0..side {
                for j in 0..side {
                    let row = &mut data[(i * side + j) * kk..(i * side + j + 1) * kk];
                    row[0] = sweep[i] as f32;
                    if kk > 1 {
                        row[1] = sweep[j] as f32;
                    }
                }
            }
            let cond = one_hot_rows(&vec![digit; side * side], p.n_classes, dev)?;
            LatentGrid {
                z: Tensor::from_vec(data, (side * side, kk), dev)?,
                cond: Some(cond),
                side,
            }
        }
        Architecture::SparseAe(_) => {
            let side = 10;
            LatentGrid {
                z: uniform_codes(side * side, kk, dev)?,
                cond: None,
                side,
            }
        }
        Architecture::Aae(_) => {
            let side = 10;
            LatentGrid {
                z: Tensor::randn(0f32, 1f32, (side * side, kk), dev)?,
                cond: None,
                side,
            }
        }
        Architecture::ConvCae(p) | Architecture::ConvCvae(p) | Architecture::ConvAae(p) => {
            let side = p.content_size.max(1);
            let nn = side * side;
            let z = match arch {
                Architecture::ConvCae(_) => uniform_codes(nn, kk, dev)?,
                _ => Tensor::randn(0f32, 1f32, (nn, kk), dev)?,
            };
            let cond = one_hot_rows(&column_labels(side), p.content_size, dev)?;
            LatentGrid {
                z,
                cond: Some(cond),
                side,
            }
        }
    };
    Ok(grid)
}

///
/// Tile decoded images row by row into one grayscale image
///
/// * `x` - (m, h * w) square images or (m, c, h, w) (first channel)
/// * `side` - number of tiles per row
///
pub fn tile_images(x: &Tensor, side: usize) -> anyhow::Result<GrayImage> {
    let x = x.to_device(&Device::Cpu)?.to_dtype(DType::F32)?;

    let dims = x.dims().to_vec();
    let (mm, hh, ww, x) = match dims.as_slice() {
        &[m, d] => {
            let h = (d as f64).sqrt().round() as usize;
            if h * h != d {
                return Err(anyhow::anyhow!("{} features aren't a square image", d));
            }
            (m, h, h, x)
        }
        &[m, _, h, w] => (m, h, w, x.narrow(1, 0, 1)?.reshape((m, h * w))?),
        dims => return Err(anyhow::anyhow!("can't tile images of shape {:?}", dims)),
    };

    if side == 0 {
        return Err(anyhow::anyhow!("empty grid"));
    }
    let rows = mm.div_ceil(side);
    let pixels = x.clamp(0f32, 1f32)?.to_vec2::<f32>()?;

    let mut img = GrayImage::new((side * ww) as u32, (rows * hh) as u32);
    for (t, tile) in pixels.iter().enumerate() {
        let (r, c) = (t / side, t % side);
        for (p, &v) in tile.iter().enumerate() {
            let (y, x) = (r * hh + p / ww, c * ww + p % ww);
            img.put_pixel(x as u32, y as u32, Luma([(v * 255.0).round() as u8]));
        }
    }
    Ok(img)
}

/// `<output>/<arch>_<tag>.png`
pub fn grid_file(output: &Path, arch_name: &str, tag: &str) -> PathBuf {
    output.join(format!("{}_{}.png", arch_name, tag))
}

///
/// Decode the latent grid of `arch` and write it as a PNG
///
pub fn write_latent_grid<M: GenerativeModelT>(
    model: &M,
    arch: &Architecture,
    dev: &Device,
    output: &Path,
    tag: &str,
) -> anyhow::Result<PathBuf> {
    let grid = latent_grid(arch, dev)?;
    let x_hat = model.generate(&grid.z, grid.cond.as_ref())?;
    let img = tile_images(&x_hat, grid.side)?;

    let file = grid_file(output, arch.name(), tag);
    mkdir(&file)?;
    img.save(&file)?;
    info!("Wrote {}", file.display());
    Ok(file)
}

///
/// Latent features as TSV: header `z_1 .. z_k label`, one row per sample
///
pub fn write_features(z_nk: &Tensor, labels_n: Option<&Tensor>, file: &Path) -> anyhow::Result<()> {
    let z = z_nk.to_device(&Device::Cpu)?.to_vec2::<f32>()?;
    let kk = z_nk.dims2()?.1;

    let labels: Option<Vec<u32>> = match labels_n {
        Some(y) => Some(y.to_device(&Device::Cpu)?.to_dtype(DType::U32)?.to_vec1::<u32>()?),
        None => None,
    };

    let mut header: Vec<String> = (1..=kk).map(|k| format!("z_{}", k)).collect();
    if labels.is_some() {
        header.push("label".to_string());
    }

    let mut lines: Vec<Box<str>> = Vec::with_capacity(z.len() + 1);
    lines.push(header.join("\t").into_boxed_str());
    for (i, row) in z.iter().enumerate() {
        let mut cols: Vec<String> = row.iter().map(|x| format!("{}", x)).collect();
        if let Some(y) = labels.as_ref() {
            cols.push(format!("{}", y[i]));
        }
        lines.push(cols.join("\t").into_boxed_str());
    }

    mkdir(file)?;
    write_lines(&lines, file)?;
    info!("Wrote {} features to {}", z.len(), file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn quantile_grid_is_symmetric() -> anyhow::Result<()> {
        let qq = normal_quantile_grid(15)?;
        assert_eq!(qq.len(), 15);
        assert_abs_diff_eq!(qq[7], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(qq[0], -qq[14], epsilon = 1e-6);
        assert_abs_diff_eq!(qq[14], 2.326348, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn grids_match_each_architecture() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        for name in ARCH_NAMES {
            let arch = Architecture::from_name(name)?;
            let grid = latent_grid(&arch, &dev)?;
            let nn = grid.side * grid.side;
            assert_eq!(grid.z.dims(), &[nn, arch.latent().total()], "{}", name);
            assert_eq!(grid.cond.is_some(), arch.needs_labels(), "{}", name);
            if let Some(cond) = grid.cond {
                assert_eq!(cond.dims(), &[nn, arch.n_classes()]);
                let ones = cond.sum(1)?.to_vec1::<f32>()?;
                assert!(ones.iter().all(|&s| s == 1.0));
            }
        }
        Ok(())
    }

    #[test]
    fn tiles_flat_and_padded_images() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let flat = Tensor::ones((6, 16), DType::F32, &dev)?;
        let img = tile_images(&flat, 3)?;
        assert_eq!(img.dimensions(), (12, 8));
        assert_eq!(img.get_pixel(11, 7), &Luma([255]));

        let padded = Tensor::zeros((4, 1, 32, 32), DType::F32, &dev)?;
        assert_eq!(tile_images(&padded, 2)?.dimensions(), (64, 64));

        let odd = Tensor::zeros((2, 15), DType::F32, &dev)?;
        assert!(tile_images(&odd, 2).is_err());
        Ok(())
    }

    #[test]
    fn features_tsv_has_header_and_labels() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("features").join("vae.tsv");

        let z = Tensor::new(&[[0.5f32, -1.0], [2.0, 0.0]], &dev)?;
        let y = Tensor::new(&[7u32, 1], &dev)?;
        write_features(&z, Some(&y), &file)?;

        let text = std::fs::read_to_string(&file)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["z_1\tz_2\tlabel", "0.5\t-1\t7", "2\t0\t1"]);
        Ok(())
    }
}
