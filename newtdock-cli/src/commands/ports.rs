//! Serial port listing.

use console::style;
use log::warn;
use newtdock::PortInfo;

/// One human-readable line per port.
fn describe(port: &PortInfo) -> String {
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = match port.product.as_deref() {
        Some(product) if !product.is_empty() => format!(" - {}", style(product).dim()),
        _ => String::new(),
    };
    format!(
        "{} [{}]{}{}",
        style(&port.name).cyan(),
        port.kind,
        vid_pid,
        product
    )
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) {
    let ports = newtdock::port::available_ports().unwrap_or_else(|e| {
        warn!("Failed to enumerate serial ports: {e}");
        Vec::new()
    });

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_else(|_| "[]".to_string())
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }
    for port in &ports {
        eprintln!("  {} {}", style("•").green(), describe(port));
    }
}
