//! Enable/disable unit files, daemon-reload

use sysd_client::{Bus, SystemdClient, UnitFileChange};

fn print_changes(changes: &[UnitFileChange]) {
    for change in changes {
        match change.change_type.as_str() {
            "symlink" => println!("Created symlink {} → {}", change.filename, change.destination),
            "unlink" => println!("Removed {}", change.filename),
            other => println!("{} {} → {}", other, change.filename, change.destination),
        }
    }
}

pub async fn enable(
    bus: Bus,
    files: &[String],
    runtime: bool,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;
    let files: Vec<&str> = files.iter().map(String::as_str).collect();
    let (has_install_info, changes) = client.enable_unit_files(&files, runtime, force).await?;

    print_changes(&changes);
    if !has_install_info {
        eprintln!("The unit files have no [Install] section, nothing to enable");
    }
    Ok(())
}

pub async fn disable(
    bus: Bus,
    files: &[String],
    runtime: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;
    let files: Vec<&str> = files.iter().map(String::as_str).collect();
    let changes = client.disable_unit_files(&files, runtime).await?;
    print_changes(&changes);
    Ok(())
}

pub async fn daemon_reload(bus: Bus) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;
    client.reload().await?;
    Ok(())
}
