use bytes_kv::{Config, Session};
use std::io::Write;
use test_log::test;

fn active_segment(folder: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
    let mut data_files = std::fs::read_dir(folder)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    data_files.retain(|p| p.extension().is_some_and(|ext| ext == "data"));
    data_files.sort();

    Ok(data_files.last().expect("has data files").clone())
}

#[test]
fn recovery_ignores_torn_tail() -> bytes_kv::Result<()> {
    let folder = tempfile::tempdir()?;
    let session = Session::new("public", "t");

    {
        let db = Config::new(&folder).open()?;
        db.put(&session, "a", "1")?;
        db.put(&session, "b", "2")?;
        db.close()?;
    }

    // A crash mid-append leaves a partial record at the tail
    {
        let path = active_segment(&folder.path().join("public/t"))?;
        let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
        file.write_all(&[0xAB, 0xCD, 0xEF, 0x00, 0x00, 0x17, 0x42])?;
    }

    {
        let db = Config::new(&folder).open()?;
        assert_eq!(b"1", &*db.get(&session, "a")?);
        assert_eq!(b"2", &*db.get(&session, "b")?);
        assert_eq!(2, db.keys(&session)?.len());
    }

    Ok(())
}

#[test]
fn recovery_ignores_truncated_record() -> bytes_kv::Result<()> {
    let folder = tempfile::tempdir()?;
    let session = Session::new("public", "t");

    {
        let db = Config::new(&folder).open()?;
        db.put(&session, "a", "1")?;
        db.put(&session, "torn", "this value loses its tail")?;
        db.close()?;
    }

    // Chop a few bytes off the last record
    {
        let path = active_segment(&folder.path().join("public/t"))?;
        let len = path.metadata()?.len();

        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_len(len - 5)?;
    }

    {
        let db = Config::new(&folder).open()?;
        assert_eq!(b"1", &*db.get(&session, "a")?);
        assert!(matches!(
            db.get(&session, "torn"),
            Err(bytes_kv::Error::KeyNotFound)
        ));
    }

    Ok(())
}

#[test]
fn recovery_after_torn_tail_keeps_accepting_writes() -> bytes_kv::Result<()> {
    let folder = tempfile::tempdir()?;
    let session = Session::new("public", "t");

    {
        let db = Config::new(&folder).open()?;
        db.put(&session, "a", "1")?;
        db.close()?;
    }

    {
        let path = active_segment(&folder.path().join("public/t"))?;
        let len = path.metadata()?.len();

        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_len(len - 2)?;
    }

    {
        let db = Config::new(&folder).open()?;
        assert!(db.keys(&session)?.is_empty());

        db.put(&session, "b", "2")?;
        assert_eq!(b"2", &*db.get(&session, "b")?);
        db.close()?;
    }

    // The write after the torn tail survives the next reopen
    {
        let db = Config::new(&folder).open()?;
        assert_eq!(b"2", &*db.get(&session, "b")?);
    }

    Ok(())
}

#[test]
fn recovery_detects_corrupt_record_on_read() -> bytes_kv::Result<()> {
    let folder = tempfile::tempdir()?;
    let session = Session::new("public", "t");

    {
        let db = Config::new(&folder).open()?;
        db.put(&session, "a", "payload")?;
        db.close()?;
    }

    // Flip a byte inside the stored value
    {
        let path = active_segment(&folder.path().join("public/t"))?;
        let mut bytes = std::fs::read(&path)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes)?;
    }

    {
        let db = Config::new(&folder).open()?;

        // The directory still lists the key (the scanner does not
        // checksum), but the positioned read rejects the record
        assert!(matches!(
            db.get(&session, "a"),
            Err(bytes_kv::Error::ChecksumMismatch { .. })
        ));
    }

    Ok(())
}
