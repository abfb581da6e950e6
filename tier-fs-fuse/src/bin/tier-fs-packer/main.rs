mod cli;

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;

use clap::Parser;
use cli::Cli;
use tier_fs::{SECTOR_SIZE, TierFileSystem};
use tier_fs_fuse::BlockFile;

const TOTAL_SECTORS: usize = 16 * 2048;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout_dir={:?}", cli.source, cli.out_dir);

    let block_file = Arc::new(BlockFile(Mutex::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(cli.out_dir.join("fs.img"))?;
        fd.set_len((TOTAL_SECTORS * SECTOR_SIZE) as u64).unwrap();

        fd
    })));

    let tfs = TierFileSystem::format(block_file, TOTAL_SECTORS).expect("formatting failed");
    let root = tfs.open_root().expect("no root directory");

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .expect("file name is not UTF-8");
        println!("file: {name:?}");

        let mut data: Vec<u8> = Vec::new();
        File::open(entry.path())?.read_to_end(&mut data)?;

        tfs.create(&root, &name, 0).expect("create failed");
        let mut file = tfs.open(&root, &name).expect("open failed");
        file.write(&data, &tfs).expect("write failed");
        tfs.close_file(file);
    }

    tfs.close_dir(root);
    tfs.unmount();
    Ok(())
}
