//! Print build configuration and capabilities of the installed engine.
//!
//! Usage: `cargo run --example engine_info`

use lammps_gate::LammpsBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    if !lammps_gate::is_available() {
        eprintln!("engine library not found on this machine");
        return Ok(());
    }

    let mut lmp = LammpsBuilder::new().arg("-log").arg("none").build()?;

    println!("version:  {}", lmp.version()?);
    println!("host:     {}", lmp.os_info());
    println!("mpi:      {}", lmp.has_mpi_support());
    println!("errors:   {}", lmp.has_exception_support());
    println!("gzip:     {}", lmp.has_gzip_support());
    println!("png:      {}", lmp.has_png_support());
    println!("jpeg:     {}", lmp.has_jpeg_support());
    println!("ffmpeg:   {}", lmp.has_ffmpeg_support());

    println!("packages: {}", lmp.installed_packages().join(", "));

    for (package, categories) in lmp.accelerator_config()? {
        for (category, settings) in categories {
            if !settings.is_empty() {
                println!("accel:    {package} {category}: {}", settings.join(", "));
            }
        }
    }

    for (style, name) in lmp.available_plugins() {
        println!("plugin:   {style} {name}");
    }

    let pair_styles = lmp.available_styles("pair")?;
    println!("pair styles compiled in: {}", pair_styles.len());

    lmp.close();
    Ok(())
}
