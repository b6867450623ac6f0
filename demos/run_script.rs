//! Run a LAMMPS input script through the gateway.
//!
//! Usage: `cargo run --example run_script -- path/to/in.script`
//!
//! Requires the engine library (`liblammps`) to be loadable on this machine.

use lammps_gate::LammpsBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let script = std::env::args()
        .nth(1)
        .ok_or("usage: run_script <input file>")?;

    let mut lmp = LammpsBuilder::new().arg("-log").arg("none").build()?;
    println!("engine version: {}", lmp.version()?);

    lmp.file(&script)?;

    println!("atoms after script: {}", lmp.natoms()?);
    println!("temperature:        {}", lmp.get_thermo("temp")?.unwrap_or_default());
    println!("potential energy:   {}", lmp.get_thermo("pe")?.unwrap_or_default());

    let b = lmp.extract_box()?;
    println!("box: {:?} .. {:?}", b.lo, b.hi);

    lmp.close();
    Ok(())
}
