//! Show unit properties, signal unit processes

use sysd_client::{Bus, SystemdClient};

pub async fn show(bus: Bus, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;
    let props = client.get_unit_properties(name).await?;

    let mut keys: Vec<_> = props.keys().collect();
    keys.sort();
    for key in keys {
        println!("{}={:?}", key, props[key]);
    }

    Ok(())
}

pub async fn kill(bus: Bus, name: &str, signal: i32) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;
    client.kill_unit(name, signal).await?;
    println!("● {} - sent signal {}", name, signal);
    Ok(())
}
