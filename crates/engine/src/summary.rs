//! The one-line session summary.

/// Renders the done-line for a batch, e.g.
/// `1.205 MiB (1263616 bytes) retrieved in 3 file(s) [BURST * 2]`.
///
/// `appends` counts resumed files, `bursts` counts follow-up sessions on
/// the same connection; both tags are omitted when zero.
#[must_use]
pub fn done_line(bytes: u64, files: usize, verb: &str, appends: u32, bursts: u32) -> String {
    let mut line = if bytes < 1024 {
        format!("{bytes} bytes {verb} in {files} file(s)")
    } else {
        let (scaled, unit) = scale(bytes);
        format!("{scaled:.3} {unit} ({bytes} bytes) {verb} in {files} file(s)")
    };
    match appends {
        0 => {}
        1 => line.push_str(" [APPEND]"),
        n => line.push_str(&format!(" [APPEND * {n}]")),
    }
    match bursts {
        0 => {}
        1 => line.push_str(" [BURST]"),
        n => line.push_str(&format!(" [BURST * {n}]")),
    }
    line
}

fn scale(bytes: u64) -> (f64, &'static str) {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KIB * KIB * KIB {
        (bytes / (KIB * KIB * KIB), "GiB")
    } else if bytes >= KIB * KIB {
        (bytes / (KIB * KIB), "MiB")
    } else {
        (bytes / KIB, "KiB")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_batches_skip_the_unit() {
        assert_eq!(done_line(512, 1, "retrieved", 0, 0), "512 bytes retrieved in 1 file(s)");
    }

    #[test]
    fn large_batches_carry_unit_and_exact_bytes() {
        let line = done_line(1_263_616, 3, "retrieved", 0, 0);
        assert_eq!(line, "1.205 MiB (1263616 bytes) retrieved in 3 file(s)");
    }

    #[test]
    fn tags_count_appends_and_bursts() {
        let line = done_line(2048, 1, "mailed", 1, 3);
        assert_eq!(line, "2.000 KiB (2048 bytes) mailed in 1 file(s) [APPEND] [BURST * 3]");
    }

    #[test]
    fn gigabyte_scale() {
        let line = done_line(3 * 1024 * 1024 * 1024, 1, "retrieved", 0, 0);
        assert!(line.starts_with("3.000 GiB"));
    }
}
