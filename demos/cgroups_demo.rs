//! Walk a process through the full cgroup v2 lifecycle
//!
//! Run with: sudo cargo run --example cgroups_demo
//! (Requires root and a cgroup v2 unified mount at /sys/fs/cgroup)

use std::process::Command;
use std::time::Duration;

use cgvisor::cgroups::{Manager, ResourceSpec};
use cgvisor::identity;
use cgvisor::CgroupConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    cgvisor::tracing::init_tracing(false)?;

    println!("┌─────────────────────────────────────────┐");
    println!("│  cgroups v2 resource lifecycle demo     │");
    println!("└─────────────────────────────────────────┘\n");

    // Using libc directly since the caller may not be in the passwd database
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        eprintln!(
            "Warning: Not running as root (euid={}). cgroup operations may fail.",
            euid
        );
        eprintln!("   Run with: sudo cargo run --example cgroups_demo\n");
    }
    if let Ok(user) = identity::current_user() {
        let groups = identity::resolve_groups_batch(&[user.gid, 0]).await;
        println!("Running as {} (groups: {:?})\n", user.name, groups);
    }

    println!("1. Spawning test process...");
    let mut child = Command::new("sleep").arg("30").spawn()?;
    let pid = child.id() as i32;
    println!("   Spawned 'sleep 30' with PID {}", pid);

    let config = CgroupConfig::from_env();
    let mut manager = Manager::new(config.clone(), pid)?;

    println!("\n2. Creating cgroup and applying demos/limits.json...");
    let limits = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/limits.json");
    match manager.apply_from_file(limits) {
        Ok(()) => println!("   ✅ Limits applied"),
        Err(e) => {
            eprintln!("   ❌ Failed to apply limits: {}", e);
            let _ = child.kill();
            let _ = manager.remove();
            return Err(e.into());
        }
    }

    let cgroup_dir = manager.path().map(|p| p.full()).unwrap_or_default();
    for entry in ["pids.max", "memory.max", "cpu.max", "cpu.weight", "cgroup.procs"] {
        let path = cgroup_dir.join(entry);
        match std::fs::read_to_string(&path) {
            Ok(content) => println!("   {} = {}", entry, content.trim()),
            Err(_) => println!("   {} not present", entry),
        }
    }

    println!("\n3. Patching the pids limit from a fresh manager...");
    let mut rehydrated = Manager::from_pid(config, pid)?;
    let patch = ResourceSpec::from_json_str(r#"{ "pids": { "limit": 512 } }"#)?;
    rehydrated.update(&patch)?;
    println!(
        "   pids.max = {}",
        std::fs::read_to_string(cgroup_dir.join("pids.max"))?.trim()
    );

    println!("\n4. Freezing and thawing...");
    rehydrated.pause()?;
    match rehydrated.wait_for_freeze(Duration::from_secs(2)) {
        Ok(()) => println!("   ✅ Frozen ({:?})", rehydrated.freezer_state()?),
        Err(e) => eprintln!("   ❌ Freeze did not converge: {}", e),
    }
    rehydrated.resume()?;
    println!("   ✅ Running ({:?})", rehydrated.freezer_state()?);

    println!("\n5. Cleaning up...");
    child.kill()?;
    child.wait()?;
    rehydrated.remove()?;
    // The second removal finds nothing and still succeeds
    manager.remove()?;
    println!("   ✅ Cgroup removed");

    println!("\nManager metrics:\n{}", cgvisor::metrics::gather_text());
    Ok(())
}
