use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shear_sim::catalogs::GalaxyCatalogConfig;
use shear_sim::draw::{to_pixel_frame, StampDrawer};
use shear_sim::noise::add_gaussian_noise;
use shear_sim::profile::Profile;
use shear_sim::sim::make_se_wcs;
use shear_sim::{
    make_fixed_psf, make_galaxy_catalog, make_sim, DrawMethod, GalaxyType, Layout, SimConfig,
};

fn bench_draw_stamp(c: &mut Criterion) {
    let wcs = make_se_wcs(201, (0.0, 0.0), None);
    let jac = wcs.jacobian();
    let galaxy = to_pixel_frame(
        &Profile::Exponential {
            half_light_radius: 0.5,
            flux: 1.0e5,
        }
        .shear(0.02, 0.0),
        &jac,
    );
    let psf = to_pixel_frame(&Profile::gaussian_from_fwhm(0.8, 1.0), &jac);

    let mut group = c.benchmark_group("draw_stamp");
    group.bench_function("fft_33px_cached", |b| {
        let mut drawer = StampDrawer::new();
        b.iter(|| {
            drawer.draw_fft(
                black_box(&galaxy),
                black_box(&psf),
                (100.3, 100.7),
                33,
                true,
                true,
            )
        })
    });
    group.bench_function("phot_1e5", |b| {
        let mut drawer = StampDrawer::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut image = Array2::<f64>::zeros((201, 201));
        b.iter(|| {
            drawer.draw_phot(
                black_box(&galaxy),
                black_box(&psf),
                (100.3, 100.7),
                &mut image,
                &mut rng,
            )
        })
    });
    group.finish();
}

fn bench_noise(c: &mut Criterion) {
    let mut image = Array2::<f64>::zeros((1024, 1024));
    c.bench_function("gaussian_noise_1024x1024", |b| {
        b.iter(|| add_gaussian_noise(image.view_mut(), black_box(1.0), 42))
    });
}

fn bench_make_sim(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_sim");
    group.sample_size(10);
    for (name, method) in [("fft", DrawMethod::Fft), ("phot", DrawMethod::Phot)] {
        group.bench_function(format!("coadd_201_grid_{name}"), |b| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(42);
                let config = GalaxyCatalogConfig::new(GalaxyType::Fixed, 201, 20, Layout::Grid);
                let galaxies = make_galaxy_catalog(&mut rng, &config).unwrap();
                let psf = make_fixed_psf("gauss").unwrap();
                let mut sim_config = SimConfig::new(201);
                sim_config.draw_method = method;
                make_sim(&mut rng, &galaxies, None, &psf, black_box(&sim_config)).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_draw_stamp, bench_noise, bench_make_sim);
criterion_main!(benches);
