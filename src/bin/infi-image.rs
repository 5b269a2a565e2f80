use std::path::Path;

use anyhow::{bail, Context, Result};
use infi_image::artifact::bootcfg::BootConfig;
use infi_image::artifact::fsimage::build_fs_image;
use infi_image::artifact::iso::{build_iso, MkisofsMaster};
use infi_image::artifact::staging::BootInputs;
use infi_image::emitter::{write_depfile, DiscImageEmitter, Emitter, FsImageEmitter};
use infi_image::{preflight, BuildConfig, Manifest, ResolvedManifest};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  infi-image fsimage <config.toml> <manifest.toml> <output.tar>\n  infi-image iso <config.toml> <cdboot.bin> <loader.bin> <fsimage.tar> <output.iso>\n  infi-image deps fsimage <config.toml> <manifest.toml> <output.tar> <depfile>\n  infi-image deps iso <cdboot.bin> <loader.bin> <fsimage.tar> <output.iso> <depfile>\n  infi-image bootcfg <config.toml>"
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, config, manifest, output] if cmd == "fsimage" => {
            fsimage(Path::new(config), Path::new(manifest), Path::new(output))
        }
        [cmd, config, cdboot, loader, fsimage, output] if cmd == "iso" => iso(
            Path::new(config),
            BootInputs {
                cdboot: cdboot.into(),
                loader: loader.into(),
                fsimage: fsimage.into(),
            },
            Path::new(output),
        ),
        [deps, kind, config, manifest, output, depfile] if deps == "deps" && kind == "fsimage" => {
            fsimage_deps(
                Path::new(config),
                Path::new(manifest),
                Path::new(output),
                Path::new(depfile),
            )
        }
        [deps, kind, cdboot, loader, fsimage, output, depfile]
            if deps == "deps" && kind == "iso" =>
        {
            let emitter = DiscImageEmitter {
                cdboot: Path::new(cdboot),
                loader: Path::new(loader),
            };
            let (_, sources) = emitter.emit(vec![output.into()], vec![fsimage.into()])?;
            write_depfile(Path::new(output), &sources, Path::new(depfile))
        }
        [cmd, config] if cmd == "bootcfg" => {
            let config = BuildConfig::load(Path::new(config))?;
            print!("{}", BootConfig::from_build_config(&config));
            Ok(())
        }
        _ => bail!(usage()),
    }
}

fn load_inputs(config: &Path, manifest: &Path) -> Result<(BuildConfig, ResolvedManifest)> {
    let config = BuildConfig::load(config)?;
    let manifest = Manifest::load(manifest)?
        .resolve(&config)
        .with_context(|| format!("resolving manifest '{}'", manifest.display()))?;
    Ok((config, manifest))
}

fn fsimage(config: &Path, manifest: &Path, output: &Path) -> Result<()> {
    let (config, manifest) = load_inputs(config, manifest)?;
    build_fs_image(&manifest, &config, output)
        .with_context(|| format!("building filesystem image '{}'", output.display()))?;
    Ok(())
}

fn fsimage_deps(config: &Path, manifest_path: &Path, output: &Path, depfile: &Path) -> Result<()> {
    let (config, manifest) = load_inputs(config, manifest_path)?;
    let emitter = FsImageEmitter {
        manifest: &manifest,
        config: &config,
    };
    let (_, sources) = emitter.emit(
        vec![output.to_path_buf()],
        vec![manifest_path.to_path_buf()],
    )?;
    write_depfile(output, &sources, depfile)
}

fn iso(config: &Path, inputs: BootInputs, output: &Path) -> Result<()> {
    let config = BuildConfig::load(config)?;
    preflight::check_iso_tools(&config)?;

    let master = MkisofsMaster::new(config.mastering.tool.clone());
    build_iso(&config, &inputs, output, &master)
        .with_context(|| format!("building ISO image '{}'", output.display()))
}
