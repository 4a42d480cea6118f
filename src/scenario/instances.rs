use std::path::Path;

/// the instance stream: one path per line, driven in the order read
pub fn read_instances(path: &Path) -> std::io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "a.cnf\n\n# staging\n  b.cnf  \nc.cnf").expect("write");
        let instances = read_instances(file.path()).expect("read");
        assert!(instances == vec!["a.cnf", "b.cnf", "c.cnf"]);
    }
}
