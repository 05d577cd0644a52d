//! CLI subcommand implementations.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use sdl2::video::GLProfile;

use covercache::spiral::Spiral;
use covercache::{
    CoverCollection, DirCollection, GlGpu, InitError, LoaderConfig, Lookup, SdlLoaderContext,
    TexLoader,
};

fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    match path {
        Some(p) => LoaderConfig::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(LoaderConfig::load_default()),
    }
}

pub fn order(count: usize, center: usize, capacity: Option<usize>) -> Result<()> {
    if count == 0 {
        println!("Empty collection.");
        return Ok(());
    }
    if center >= count {
        bail!("center {} is outside 0..{}", center, count);
    }
    let budget = capacity.map(|cap| {
        LoaderConfig {
            cache_capacity: cap.max(1),
            ..LoaderConfig::default()
        }
        .load_budget()
    });

    let mut spiral = Spiral::new(center);
    let mut n = 0usize;
    while let Some(pick) = spiral.next_pick(count) {
        n += 1;
        let mark = match budget {
            Some(b) if n <= b => "*",
            _ => " ",
        };
        println!("{:>5} {} {:>6} {:+}", n, mark, pick.rank, pick.offset);
    }
    if let Some(b) = budget {
        println!("* first pass ({} loads)", b.min(count));
    }
    Ok(())
}

pub fn warm(
    dir: &Path,
    center: usize,
    capacity: Option<usize>,
    config_path: Option<&Path>,
    timeout_secs: u64,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(cap) = capacity {
        config.cache_capacity = cap;
    }

    let collection = Arc::new(DirCollection::open(dir));
    let count = collection.count();
    if count == 0 {
        bail!("no images in {}", dir.display());
    }
    let center = center.min(count - 1);
    println!("Warming {} ({} covers, center {})", dir.display(), count, center);

    // ── SDL2 + OpenGL ───────────────────────────────────────────────────
    let sdl = sdl2::init().map_err(anyhow::Error::msg)?;
    let video = sdl.video().map_err(anyhow::Error::msg)?;

    let gl_attr = video.gl_attr();
    gl_attr.set_context_profile(GLProfile::Core);
    gl_attr.set_context_version(3, 3);

    let window = video
        .window("covercache", 64, 64)
        .opengl()
        .hidden()
        .build()
        .map_err(|e| InitError::Window(e.to_string()))?;
    let primary = window.gl_create_context().map_err(InitError::Context)?;
    window
        .gl_make_current(&primary)
        .map_err(anyhow::Error::msg)?;
    gl::load_with(|name| video.gl_get_proc_address(name) as *const _);

    let (loader_ctx, _loader_gl) = SdlLoaderContext::create_shared(&window, &primary)?;

    // ── Loader ──────────────────────────────────────────────────────────
    let redraws = Arc::new(AtomicU64::new(0));
    let r = redraws.clone();
    let loader = TexLoader::new(
        config,
        collection.clone(),
        Box::new(loader_ctx),
        Arc::new(GlGpu),
        move || {
            r.fetch_add(1, Ordering::Relaxed);
        },
    )?;
    loader.set_center(collection.pos(center));
    loader.resume_loading();

    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    loop {
        // primary context is current here
        loader.run_gl_delete();
        if loader.is_idle() && loader.pending_uploads() == 0 {
            break;
        }
        if start.elapsed() > timeout {
            tracing::warn!("warm: pass not finished after {}s", timeout_secs);
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let elapsed = start.elapsed();

    for rank in loader.cached_ranks() {
        let state = match loader.lookup(collection.pos(rank)) {
            Lookup::Ready(info) => format!("{}x{} tex {}", info.width, info.height, info.gl_id),
            Lookup::NoCover => "no cover".to_string(),
            Lookup::Pending => "pending".to_string(),
            Lookup::Missing => continue,
        };
        let name = collection
            .path(rank)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("{:>6}  {:<20} {}", rank, state, name);
    }
    println!(
        "Cached {} of {} in {:.1}s ({}, redraw callbacks {})",
        loader.cache_len(),
        count,
        elapsed.as_secs_f64(),
        loader.stats(),
        redraws.load(Ordering::Relaxed)
    );

    drop(loader);
    Ok(())
}

pub fn config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    match path.map(Path::to_path_buf).or_else(LoaderConfig::default_path) {
        Some(p) if p.exists() => println!("# {}", p.display()),
        Some(p) => println!("# {} (not found, defaults)", p.display()),
        None => println!("# defaults"),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
