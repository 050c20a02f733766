/// mktest — generate deterministic test data under testdata/
///
/// Run with: cargo run --bin mktest
///
/// Wipes and recreates testdata/candidate and testdata/repository.
/// Expected reconciliation of the repository against the candidate:
///   "hello world\n"   — repository copies under photos/ kept, dup/ deleted
///   "roses are red\n" — neither copy in the candidate: undecided
///   128 KB 0xAB block — one copy kept, one deleted
/// Expected new files (repository content missing from the candidate):
///   repository/poems/poem.txt, repository/poems/poem_copy.txt,
///   repository/unique.txt
///
/// Symlink layout (Unix only):
///   testdata/candidate/linked -> ../repository/photos
///   Used to test --follow-symlinks behaviour.

use std::fs;
use std::io::Write;
use std::path::Path;

fn main() {
    let root = Path::new("testdata");

    // Wipe and recreate
    if root.exists() {
        fs::remove_dir_all(root).expect("remove testdata");
    }
    let candidate = root.join("candidate");
    let repository = root.join("repository");

    // ── candidate/ ────────────────────────────────────────────────────────────
    let big_data = vec![0xABu8; 128 * 1024];
    write_file(&candidate.join("photos/hello.txt"), b"hello world\n");
    write_file(&candidate.join("photos/big.bin"), &big_data);
    write_file(&candidate.join("fresh.txt"), b"only in the candidate\n");
    write_file(&candidate.join("nested/hello_copy.txt"), b"hello world\n");
    write_file(&candidate.join(".hidden_dup.txt"), b"hello world\n");

    // ── repository/ ───────────────────────────────────────────────────────────
    write_file(&repository.join("photos/hello.txt"), b"hello world\n");
    write_file(&repository.join("dup/hello.txt"), b"hello world\n");
    write_file(&repository.join("photos/big.bin"), &big_data);
    write_file(&repository.join("old/big_copy.bin"), &big_data);
    write_file(&repository.join("poems/poem.txt"), b"roses are red\n");
    write_file(&repository.join("poems/poem_copy.txt"), b"roses are red\n");
    write_file(&repository.join("unique.txt"), b"unique repository content\n");

    #[cfg(unix)]
    std::os::unix::fs::symlink("../repository/photos", candidate.join("linked"))
        .unwrap_or_else(|e| eprintln!("warning: could not create symlink: {e}"));

    // ── Summary ───────────────────────────────────────────────────────────────
    let snap = "testdata/repository.db";
    println!("Test data created under testdata/");
    println!();
    println!("Expected duplicate sets in the repository:");
    println!("  \"hello world\\n\"    photos/hello.txt keep, dup/hello.txt delete");
    println!("  128 KB 0xAB block  photos/big.bin keep, old/big_copy.bin delete");
    println!("  \"roses are red\\n\"  undecided (no copy in the candidate)");
    println!();
    println!("Test commands:");
    println!("  cargo run -- testdata/candidate");
    println!("  cargo run -- testdata/repository --save-snapshot {snap}");
    println!("  cargo run -- testdata/candidate --load-repository-snapshot {snap}");
    println!("  cargo run -- testdata/candidate --repository testdata/repository --new-files");
    println!("  cargo run -- testdata/candidate --repository testdata/repository --csv");
    println!("  cargo run -- testdata/candidate --repository testdata/repository --delete");
    println!();
    println!("With --hidden, candidate/.hidden_dup.txt joins the \"hello world\\n\" set.");
    println!("With --follow-symlinks, candidate/linked is digested as a directory.");
}

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("create {}: {}", parent.display(), e));
    }
    let mut f = fs::File::create(path)
        .unwrap_or_else(|e| panic!("create {}: {}", path.display(), e));
    f.write_all(content)
        .unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
}
