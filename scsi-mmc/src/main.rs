// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

mod args;

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, Write},
    path::PathBuf,
    process::exit,
    sync::Arc,
};

use clap::Parser;
use log::{error, info};
use scsi_mmc::scsi::{
    emulation::{
        medium::ImageMedium,
        mmc::{LunError, MmcConfig, MmcLun},
        LogicalUnit,
    },
    CmdError, Disposition, LunRequest,
};
use thiserror::Error as ThisError;

use crate::args::{ScsiMmcArgs, Step};

#[derive(Debug, ThisError)]
enum Error {
    #[error("Failed to open image {0}: {1}")]
    OpenImage(PathBuf, io::Error),
    #[error("Failed to set up the drive: {0}")]
    Init(LunError),
    #[error("Medium change failed: {0}")]
    MediumChange(LunError),
    #[error("Command {0} failed: {1}")]
    Command(u64, CmdError),
    #[error("Failed writing output: {0}")]
    Output(io::Error),
}

type Result<T> = std::result::Result<T, Error>;

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        // writing into a String can't fail
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn create_lun(args: &ScsiMmcArgs) -> Result<(Arc<ImageMedium>, MmcLun<ImageMedium>)> {
    let medium = Arc::new(match &args.image {
        Some(path) => ImageMedium::open(path).map_err(|e| Error::OpenImage(path.clone(), e))?,
        None => ImageMedium::empty(),
    });
    let config = MmcConfig {
        vendor: args.vendor.clone(),
        product: args.product.clone(),
        revision: args.revision.clone(),
    };
    let lun = MmcLun::init(Arc::clone(&medium), config).map_err(Error::Init)?;
    info!("Drive ready with {} sectors", lun.total_sectors());
    Ok((medium, lun))
}

struct Script {
    medium: Arc<ImageMedium>,
    lun: MmcLun<ImageMedium>,
    next_id: u64,
}

impl Script {
    fn run_step(&mut self, step: &Step, out: &mut impl Write) -> Result<()> {
        match step {
            Step::Command(cdb) => {
                let id = self.next_id;
                self.next_id += 1;

                let mut data_in = Vec::new();
                let mut req = LunRequest::new(id, cdb, &mut data_in);
                let disposition = self
                    .lun
                    .process_request(&mut req)
                    .map_err(|e| Error::Command(id, e))?;
                let xfer_size = req.xfer_size();

                writeln!(out, "[{id}] cdb {} (xfer {xfer_size})", hex(cdb)).map_err(Error::Output)?;
                match disposition {
                    Disposition::Complete(output) => {
                        write!(out, "[{id}] status {:#04x}", output.status).map_err(Error::Output)?;
                        if !output.sense.is_empty() {
                            write!(out, " sense {}", hex(&output.sense)).map_err(Error::Output)?;
                        }
                        writeln!(out).map_err(Error::Output)?;
                    }
                    Disposition::Enqueued => {
                        writeln!(out, "[{id}] enqueued").map_err(Error::Output)?;
                    }
                }
                if !data_in.is_empty() {
                    writeln!(out, "[{id}] data {}", hex(&data_in)).map_err(Error::Output)?;
                }
            }
            Step::Remove => {
                self.medium.remove();
                self.lun.medium_removed();
                writeln!(out, "medium removed").map_err(Error::Output)?;
            }
            Step::Insert(path) => {
                let file = File::open(path).map_err(|e| Error::OpenImage(path.clone(), e))?;
                self.medium.insert(file);
                self.lun.medium_inserted().map_err(Error::MediumChange)?;
                writeln!(out, "medium inserted: {}", path.display()).map_err(Error::Output)?;
            }
            Step::Complete => {
                for completion in self.medium.take_completions() {
                    writeln!(
                        out,
                        "[{}] completed, status {:#04x}",
                        completion.id, completion.output.status
                    )
                    .map_err(Error::Output)?;
                }
            }
        }
        Ok(())
    }
}

fn run() -> Result<()> {
    env_logger::init();
    let args = ScsiMmcArgs::parse();
    let (medium, lun) = create_lun(&args)?;
    let mut script = Script {
        medium,
        lun,
        next_id: 0,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for step in &args.steps {
        script.run_step(step, &mut out)?;
    }
    script.lun.destroy();

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("{e}");
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn image(sectors: usize) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&vec![0xab; sectors * 2048]).unwrap();
        f
    }

    fn args(image: Option<PathBuf>) -> ScsiMmcArgs {
        ScsiMmcArgs {
            image,
            vendor: "VBOX".into(),
            product: "CD-ROM".into(),
            revision: "1.0".into(),
            steps: Vec::new(),
        }
    }

    fn script(args: &ScsiMmcArgs) -> Script {
        let (medium, lun) = create_lun(args).unwrap();
        Script {
            medium,
            lun,
            next_id: 0,
        }
    }

    fn run_steps(script: &mut Script, steps: &[&str]) -> String {
        let mut out = Vec::new();
        for step in steps {
            script.run_step(&step.parse().unwrap(), &mut out).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_missing_image() {
        let res = create_lun(&args(Some("/path/not/present.iso".into())));
        assert!(matches!(res, Err(Error::OpenImage(..))));
    }

    #[test]
    fn test_script() {
        let img = image(4);
        let mut script = script(&args(Some(img.path().into())));
        assert_eq!(script.lun.total_sectors(), 4);

        let out = run_steps(
            &mut script,
            &["000000000000", "000000000000", "28000000000300000100", "complete"],
        );
        let expected = format!(
            "[0] cdb 00 00 00 00 00 00 (xfer 0)\n\
             [0] status 0x02 sense 70 00 06 00 00 00 00 0a 00 00 00 00 28 00 00 00 00 00\n\
             [1] cdb 00 00 00 00 00 00 (xfer 0)\n\
             [1] status 0x00\n\
             [2] cdb 28 00 00 00 00 03 00 00 01 00 (xfer 2048)\n\
             [2] enqueued\n\
             [2] data {}\n\
             [2] completed, status 0x00\n",
            hex(&[0xab; 2048])
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_swap_media() {
        let mut script = script(&args(None));
        let img = image(2);
        let insert = format!("insert={}", img.path().display());

        let out = run_steps(&mut script, &[insert.as_str()]);
        assert!(out.starts_with("medium inserted"));
        assert_eq!(script.lun.total_sectors(), 2);

        run_steps(&mut script, &["remove"]);
        assert!(!script.lun.is_ready());
        let out = run_steps(&mut script, &["000000000000"]);
        // medium not present
        assert!(out.contains("sense 70 00 02 00 00 00 00 0a 00 00 00 00 3a 00"));
    }

    #[test]
    fn test_short_cdb_fails_script() {
        let mut script = script(&args(None));
        let err = script
            .run_step(&Step::Command(vec![]), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::Command(0, CmdError::CdbTooShort)));
    }
}
