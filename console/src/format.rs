use crate::install::InstallationSnapshot;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Human-readable byte count with one decimal: `KB` below 1 MiB, `MB`
/// below 1 GiB, `GB` above.
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < MIB {
        format!("{:.1} KB", bytes / KIB)
    } else if bytes < GIB {
        format!("{:.1} MB", bytes / MIB)
    } else {
        format!("{:.1} GB", bytes / GIB)
    }
}

/// One status line for a terminal, e.g.
/// `downloading: 512.0 MB / 2.0 GB (25%)`.
pub fn progress_line(snapshot: &InstallationSnapshot) -> String {
    match snapshot.progress {
        Some(p) => format!(
            "{}: {} / {} ({}%)",
            snapshot.status_text,
            format_size(p.completed),
            format_size(p.total),
            p.percentage
        ),
        None => snapshot.status_text.clone(),
    }
}
