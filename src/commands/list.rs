//! List loaded units

use sysd_client::{Bus, SystemdClient};

pub async fn list(bus: Bus) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;
    let mut units = client.list_units().await?;
    units.sort_by(|a, b| a.name.cmp(&b.name));

    println!(
        "{:<40} {:<10} {:<10} {:<12} DESCRIPTION",
        "UNIT", "LOAD", "ACTIVE", "SUB"
    );
    for unit in &units {
        let desc = unit.description.chars().take(40).collect::<String>();
        let marker = if unit.is_failed() { "×" } else { " " };
        println!(
            "{}{:<39} {:<10} {:<10} {:<12} {}",
            marker, unit.name, unit.load_state, unit.active_state, unit.sub_state, desc
        );
    }

    let active = units.iter().filter(|u| u.is_active()).count();
    println!();
    println!("{} loaded units listed, {} active", units.len(), active);

    Ok(())
}
