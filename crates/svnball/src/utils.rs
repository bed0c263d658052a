use humansize::{BINARY, format_size as format_binary};

/// Human readable archive size, e.g. `1.50 KiB`.
pub fn format_size(bytes: u64) -> String {
    format_binary(bytes, BINARY)
}

/// Join a public URL prefix and a file name with exactly one slash.
pub fn join_url(prefix: &str, name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), name.trim_start_matches('/'))
}
