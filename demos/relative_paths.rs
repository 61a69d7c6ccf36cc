// Relative debug info walkthrough
//
// Loads a module whose line table records `./a/b/c/main.cpp`, sets a
// breakpoint by full path, and shows the source map entry that gets learned.
//
// Run with: cargo run -p bkpt-core --example relative_paths

use bkpt_core::{
    BreakpointSpec, CreateOptions, Debugger, EventReply, Module, TargetEvent, TargetSettings,
};

const MODULE: &str = include_str!("../bkpt-core/tests/fixtures/relative.json");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("bkpt_core=info")
        .init();

    let debugger = Debugger::new();
    let (_, handle) = debugger.create_target("a.out", TargetSettings::default()).await;

    handle
        .events
        .send_event(TargetEvent::ModuleLoaded(Module::from_json_str(MODULE)?))
        .await?;
    println!("✓ Loaded a.out\n");

    let id = handle.target.lock().await.create_breakpoint(
        BreakpointSpec::file_line("/x/y/a/b/c/main.cpp", 2),
        CreateOptions::default(),
    )?;

    {
        let target = handle.target.lock().await;
        print!("{}", target.registry().list(true));
        println!("source map: {}", target.source_map().to_json());
    }

    handle.events.send_event(TargetEvent::ProcessLaunched).await?;
    let address = {
        let target = handle.target.lock().await;
        target
            .registry()
            .get(id)
            .and_then(|bp| bp.locations().first().map(|l| l.address))
    };

    if let Some(address) = address {
        if let EventReply::Stopped { hits } = handle
            .events
            .send_event(TargetEvent::BreakpointHit {
                address,
                module: None,
            })
            .await?
        {
            for hit in hits {
                println!("✓ Stopped at {} (hit count = {})", hit.location, hit.hit_count);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&debugger.statistics().await)?);
    Ok(())
}
