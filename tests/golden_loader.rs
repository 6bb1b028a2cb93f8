#[cfg(test)]
mod tests {
    use std::fs;

    use snax_datagen::{error::DatagenError, golden::GoldenLoader};

    #[test]
    fn mode_tensors_are_read_by_id() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("M2_z.bin"), "# dumped by the simulator\n\n-3\n7\n  12  \n").unwrap();
        let loader = GoldenLoader::new(dir.path());
        assert_eq!(loader.load_mode(2, "z").unwrap(), vec![-3, 7, 12]);
        assert_eq!(loader.mode_path(2, "z"), dir.path().join("M2_z.bin"));
    }

    #[test]
    fn missing_tensors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = GoldenLoader::new(dir.path());
        match loader.load_mode(1, "y") {
            Err(DatagenError::MissingGoldenData { path, .. }) => {
                assert_eq!(path, dir.path().join("M1_y.bin"))
            }
            other => panic!("Expected missing golden data, got {other:?}"),
        }
    }

    #[test]
    fn malformed_lines_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("D.bin"), "1\n0x2\n").unwrap();
        let loader = GoldenLoader::new(dir.path());
        match loader.load("D") {
            Err(DatagenError::GoldenParse { line, content, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "0x2");
            }
            other => panic!("Expected a parse error, got {other:?}"),
        }
    }
}
