//! Render a shear simulation and write each exposure as a PNG
//!
//! Options from `--config` (a JSON `SimConfig`) are used as the base; flags
//! given on the command line are applied on top.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use shear_sim::catalogs::{make_galaxy_catalog, make_star_catalog, GalaxyCatalogConfig, StarConfig};
use shear_sim::exposure::{Mask, MaskPlane};
use shear_sim::io::{mask_to_gray_image, save_exposure_png};
use shear_sim::{
    get_se_dim, make_fixed_psf, make_ps_psf, make_sim, BrightInfo, DrawMethod, GalaxyType,
    Layout, SimConfig,
};

/// Command line arguments for the shear simulation renderer
#[derive(Parser, Debug)]
#[command(version, about = "Weak-lensing shear image simulator")]
struct Args {
    /// Random seed
    #[arg(long, default_value_t = 8312)]
    seed: u64,

    /// JSON file holding simulation options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Coadd image side in pixels
    #[arg(long = "coadd-dim")]
    coadd_dim: Option<usize>,

    /// Object-free border in coadd pixels
    #[arg(long, default_value_t = 20)]
    buff: usize,

    /// Comma separated band names
    #[arg(long, value_delimiter = ',')]
    bands: Option<Vec<String>>,

    /// Applied shear component 1
    #[arg(long)]
    g1: Option<f64>,

    /// Applied shear component 2
    #[arg(long)]
    g2: Option<f64>,

    /// PSF type: gauss, moffat or ps
    #[arg(long, default_value = "gauss")]
    psf: String,

    /// Galaxy population: fixed or wldeblend
    #[arg(long = "gal-type", default_value = "fixed")]
    gal_type: GalaxyType,

    /// Layout: grid, random, random_disk or hex
    #[arg(long, default_value = "grid")]
    layout: Layout,

    /// Epochs per band
    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long, default_value_t = false)]
    dither: bool,

    #[arg(long, default_value_t = false)]
    rotate: bool,

    #[arg(long = "cosmic-rays", default_value_t = false)]
    cosmic_rays: bool,

    #[arg(long = "bad-columns", default_value_t = false)]
    bad_columns: bool,

    /// Add stars at this density per square arcminute
    #[arg(long = "star-density")]
    star_density: Option<f64>,

    #[arg(long = "star-bleeds", default_value_t = false)]
    star_bleeds: bool,

    /// Draw method: auto, fft, no_pixel or phot
    #[arg(long = "draw-method")]
    draw_method: Option<DrawMethod>,

    /// Directory for the PNG and JSON outputs
    #[arg(long = "output-dir", default_value = "sim_output")]
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct ExposureSummary {
    band: String,
    epoch: usize,
    nan_pixels: usize,
    saturated_pixels: usize,
    cosmic_ray_pixels: usize,
    bad_pixels: usize,
    image_png: String,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    seed: u64,
    config: &'a SimConfig,
    gal_type: GalaxyType,
    n_galaxies: usize,
    n_stars: usize,
    se_dim: usize,
    exposures: Vec<ExposureSummary>,
    bright_info: &'a [BrightInfo],
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => SimConfig::new(args.coadd_dim.unwrap_or(201)),
    };

    if let Some(coadd_dim) = args.coadd_dim {
        config.coadd_dim = coadd_dim;
    }
    if let Some(bands) = &args.bands {
        config.bands = bands.clone();
    }
    if let Some(g1) = args.g1 {
        config.g1 = g1;
    }
    if let Some(g2) = args.g2 {
        config.g2 = g2;
    }
    if let Some(epochs) = args.epochs {
        config.epochs_per_band = epochs;
    }
    if let Some(method) = args.draw_method {
        config.draw_method = method;
    }
    config.dither |= args.dither;
    config.rotate |= args.rotate;
    config.cosmic_rays |= args.cosmic_rays;
    config.bad_columns |= args.bad_columns;
    config.star_bleeds |= args.star_bleeds;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut rng = StdRng::seed_from_u64(args.seed);

    let gal_config =
        GalaxyCatalogConfig::new(args.gal_type, config.coadd_dim, args.buff, args.layout);
    let galaxies = make_galaxy_catalog(&mut rng, &gal_config)?;

    let stars = match args.star_density {
        Some(density) => {
            let star_config = StarConfig {
                density: Some(density),
                ..StarConfig::default()
            };
            Some(make_star_catalog(&mut rng, config.coadd_dim, args.buff, &star_config)?)
        }
        None => None,
    };

    let psf = if args.psf == "ps" {
        let se_dim = config
            .se_dim
            .unwrap_or_else(|| get_se_dim(config.coadd_dim, config.dither, config.rotate));
        make_ps_psf(&mut rng, se_dim)?
    } else {
        make_fixed_psf(&args.psf)?
    };

    let sim = make_sim(&mut rng, &galaxies, stars.as_ref(), &psf, &config)?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let sat_bits = MaskPlane::Sat.bit();
    let cr_bits = MaskPlane::Cr.bit();
    let bad_bits = MaskPlane::Bad.bit();
    let defect_bits = Mask::plane_bit_mask(&[MaskPlane::Bad, MaskPlane::Cr, MaskPlane::Sat]);
    let mut exposures = Vec::new();
    for (band, epochs) in &sim.band_data {
        for exposure in epochs {
            let name = format!("{band}_epoch{:02}.png", exposure.epoch);
            save_exposure_png(exposure, args.output_dir.join(&name))?;

            if exposure.mask.count(defect_bits) > 0 {
                let mask_name = format!("{band}_epoch{:02}_mask.png", exposure.epoch);
                mask_to_gray_image(&exposure.mask, defect_bits)
                    .save(args.output_dir.join(mask_name))
                    .context("Failed to save mask image")?;
            }

            exposures.push(ExposureSummary {
                band: band.clone(),
                epoch: exposure.epoch,
                nan_pixels: exposure.nan_count(),
                saturated_pixels: exposure.mask.count(sat_bits),
                cosmic_ray_pixels: exposure.mask.count(cr_bits),
                bad_pixels: exposure.mask.count(bad_bits),
                image_png: name,
            });
        }
    }

    let summary = RunSummary {
        seed: args.seed,
        config: &config,
        gal_type: galaxies.gal_type(),
        n_galaxies: galaxies.len(),
        n_stars: stars.as_ref().map_or(0, |s| s.len()),
        se_dim: sim.se_dim,
        exposures,
        bright_info: &sim.bright_info,
    };
    let summary_path = args.output_dir.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    info!(
        "wrote {} exposure(s) to {}",
        summary.exposures.len(),
        args.output_dir.display()
    );
    Ok(())
}
