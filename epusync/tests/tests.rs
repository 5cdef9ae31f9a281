use predicates::prelude::*;

struct Session {
    _tmp_dir: tempfile::TempDir,
    output: std::path::PathBuf,
    metadata: std::path::PathBuf,
}

fn setup_session() -> Session {
    let tmp_dir = tempfile::tempdir().unwrap();
    let output = tmp_dir.path().join("X");
    let metadata = tmp_dir.path().join("Y");
    let ds1 = metadata.join("ds1");
    std::fs::create_dir_all(output.join("ds1")).unwrap();
    std::fs::create_dir_all(ds1.join("Batch")).unwrap();
    std::fs::create_dir_all(ds1.join("FoilHoles")).unwrap();
    std::fs::create_dir_all(ds1.join("SearchMaps").join("s1")).unwrap();
    std::fs::write(ds1.join("FoilHoles").join("a.xml"), "foil hole").unwrap();
    std::fs::write(ds1.join("GridSquare_01.xml"), "grid square").unwrap();
    std::fs::write(ds1.join("SearchMaps").join("s1").join("img.xml"), "search map").unwrap();
    std::fs::write(ds1.join("meta.xml"), "meta").unwrap();
    Session {
        _tmp_dir: tmp_dir,
        output,
        metadata,
    }
}

fn epusync(session: &Session) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("epusync").unwrap();
    cmd.args([
        "-o",
        session.output.to_str().unwrap(),
        "-i",
        session.metadata.to_str().unwrap(),
    ]);
    cmd
}

fn get_file_content(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn check_epusync_help() {
    let mut cmd = assert_cmd::Command::cargo_bin("epusync").unwrap();
    cmd.arg("--help").assert().success();
}

#[test]
fn test_sync_basic() {
    let session = setup_session();
    epusync(&session).assert().success();
    let ds1 = session.output.join("ds1");
    assert_eq!(get_file_content(&ds1.join("meta.xml")), "meta");
    assert_eq!(
        get_file_content(&ds1.join("SearchMaps").join("s1").join("img.xml")),
        "search map"
    );
    assert!(ds1.join("Batch").is_dir());
    assert_eq!(std::fs::read_dir(ds1.join("Batch")).unwrap().count(), 0);
    assert!(!ds1.join("FoilHoles").exists());
    assert!(!ds1.join("GridSquare_01.xml").exists());
}

#[test]
fn test_sync_summary() {
    let session = setup_session();
    epusync(&session)
        .arg("--summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("\nfiles copied: 2"))
        .stdout(predicate::str::contains("datasets synced: 1"));
}

#[test]
fn test_rerun_copies_nothing() {
    let session = setup_session();
    epusync(&session).assert().success();
    let meta = session.output.join("ds1").join("meta.xml");
    std::fs::write(&meta, "edited").unwrap();
    epusync(&session)
        .arg("--summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("\nfiles copied: 0"));
    // existing destination files are never overwritten
    assert_eq!(get_file_content(&meta), "edited");
}

#[test]
fn test_dataset_only_on_one_side_is_ignored() {
    let session = setup_session();
    std::fs::create_dir_all(session.metadata.join("ds2")).unwrap();
    std::fs::write(session.metadata.join("ds2").join("meta.xml"), "ds2").unwrap();
    std::fs::create_dir_all(session.output.join("ds3")).unwrap();
    epusync(&session).assert().success();
    assert!(!session.output.join("ds2").exists());
    assert_eq!(std::fs::read_dir(session.output.join("ds3")).unwrap().count(), 0);
}

#[test]
fn test_tomo_flip_note() {
    let session = setup_session();
    let position_src = session.metadata.join("ds1").join("Position_1");
    let position_dst = session.output.join("ds1").join("Position_1");
    std::fs::create_dir_all(&position_src).unwrap();
    std::fs::create_dir_all(&position_dst).unwrap();
    std::fs::write(position_src.join("Position_1.mdoc"), "mdoc").unwrap();
    std::fs::write(position_dst.join("Position_1_001.eer"), "movie").unwrap();
    epusync(&session).assert().success();
    assert_eq!(
        get_file_content(&position_dst.join("HowToFlipMyTomoData.txt")),
        "This data is orginially written as eer by Tomo5!\n"
    );
    assert!(!position_dst.join("Position_1.mdoc").exists());
}

#[test]
fn test_atlas_copy() {
    let session = setup_session();
    let mount = session.output.parent().unwrap().join("mount");
    let atlas_dir = mount.join("Atlas").join("Atlas_1");
    std::fs::create_dir_all(&atlas_dir).unwrap();
    std::fs::write(atlas_dir.join("Atlas.dm"), "").unwrap();
    std::fs::write(atlas_dir.join("Atlas_1.mrc"), "atlas").unwrap();
    std::fs::write(
        session.metadata.join("ds1").join("EpuSession.dm"),
        r"<EpuSessionXml><AtlasId>Z:\Atlas\Atlas_1\Atlas.dm</AtlasId></EpuSessionXml>",
    )
    .unwrap();
    epusync(&session)
        .args(["-a", mount.to_str().unwrap()])
        .assert()
        .success();
    assert_eq!(
        get_file_content(&session.output.join("ds1").join("Atlas_1.mrc")),
        "atlas"
    );
}

#[test]
fn test_failing_dataset_exits_non_zero() {
    let session = setup_session();
    // a file where the search maps directory has to be mirrored
    let ds0_src = session.metadata.join("ds0");
    std::fs::create_dir_all(ds0_src.join("SearchMaps").join("s1")).unwrap();
    std::fs::create_dir_all(session.output.join("ds0")).unwrap();
    std::fs::write(session.output.join("ds0").join("SearchMaps"), "").unwrap();
    epusync(&session)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ds0"));
    // the other dataset is still synced
    assert_eq!(
        get_file_content(&session.output.join("ds1").join("meta.xml")),
        "meta"
    );
}

#[test]
fn test_quiet_suppresses_errors() {
    let session = setup_session();
    let ds0_src = session.metadata.join("ds0");
    std::fs::create_dir_all(ds0_src.join("SearchMaps").join("s1")).unwrap();
    std::fs::create_dir_all(session.output.join("ds0")).unwrap();
    std::fs::write(session.output.join("ds0").join("SearchMaps"), "").unwrap();
    epusync(&session)
        .arg("-q")
        .assert()
        .code(1)
        .stderr(predicate::str::is_empty());
}
