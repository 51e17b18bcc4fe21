use chrono::{DateTime, Utc};
use log::info;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = "model.ckpt";

/// `<dir_header>/model/<HHMMSS_DDMMYYYY>_<iteration>/model.ckpt`
pub fn checkpoint_path(dir_header: &Path, iteration: usize, now: DateTime<Utc>) -> PathBuf {
    let model_id = now.format("%H%M%S_%d%m%Y");
    dir_header
        .join("model")
        .join(format!("{}_{}", model_id, iteration))
        .join(CHECKPOINT_FILE)
}

/// Write all the variables of `varmap` (safetensors) and return the
/// file path
pub fn save_checkpoint(
    varmap: &candle_nn::VarMap,
    dir_header: &Path,
    iteration: usize,
) -> anyhow::Result<PathBuf> {
    let path = checkpoint_path(dir_header, iteration, Utc::now());
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    info!("Saving network in: {}", path.display());
    varmap.save(&path)?;
    Ok(path)
}

/// Overwrite the variables of an already built `varmap`. The saved
/// model must have the same topology (names and shapes).
pub fn load_checkpoint(varmap: &mut candle_nn::VarMap, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Err(anyhow::anyhow!("no checkpoint at {}", path.display()));
    }
    info!("Loading network from: {}", path.display());
    varmap.load(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::{VarBuilder, VarMap};
    use chrono::TimeZone;

    #[test]
    fn path_layout() {
        let now = Utc
            .with_ymd_and_hms(2019, 8, 2, 13, 5, 9)
            .single()
            .expect("valid time");
        let path = checkpoint_path(Path::new("runs"), 1500, now);
        assert_eq!(
            path,
            PathBuf::from("runs/model/130509_02082019_1500/model.ckpt")
        );
    }

    #[test]
    fn save_then_restore() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let tmp = tempfile::tempdir()?;

        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let lin = candle_nn::linear(3, 2, vs.pp("enc.fc.0"))?;
        let saved = lin.weight().to_vec2::<f32>()?;

        let path = save_checkpoint(&varmap, tmp.path(), 7)?;
        assert!(path.ends_with(CHECKPOINT_FILE));
        assert!(path
            .parent()
            .and_then(|d| d.file_name())
            .and_then(|d| d.to_str())
            .is_some_and(|d| d.ends_with("_7")));

        // clobber, then restore in place
        let mut varmap = varmap;
        for var in varmap.all_vars() {
            var.set(&Tensor::zeros(var.shape(), DType::F32, &dev)?)?;
        }
        load_checkpoint(&mut varmap, &path)?;
        assert_eq!(lin.weight().to_vec2::<f32>()?, saved);

        assert!(load_checkpoint(&mut varmap, &tmp.path().join("missing")).is_err());
        Ok(())
    }
}
