// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

use std::{path::PathBuf, str::FromStr};

use clap::Parser;

/// One step of the script run against the drive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Send a CDB, given in hex.
    Command(Vec<u8>),
    /// Take the disc out, behind the guest's back.
    Remove,
    /// Put a new disc image in.
    Insert(PathBuf),
    /// Collect the completions of enqueued reads.
    Complete,
}

fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = s
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '_'))
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(format!("'{s}' is not a whole number of hex bytes"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).map_err(|e| format!("bad hex byte '{byte}': {e}"))
        })
        .collect()
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remove" => Ok(Self::Remove),
            "complete" => Ok(Self::Complete),
            _ => match s.strip_prefix("insert=") {
                Some(path) if !path.is_empty() => Ok(Self::Insert(path.into())),
                Some(_) => Err("insert needs an image path".into()),
                None => parse_hex(s).map(Self::Command),
            },
        }
    }
}

/// Drive an emulated CD/DVD-ROM unit from the command line.
#[derive(Parser, Debug)]
pub struct ScsiMmcArgs {
    /// Disc image loaded at startup. Without one the drive starts empty.
    #[arg(long, short)]
    pub image: Option<PathBuf>,
    /// Vendor identification reported by INQUIRY.
    #[arg(long, default_value = "VBOX")]
    pub vendor: String,
    /// Product identification reported by INQUIRY.
    #[arg(long, default_value = "CD-ROM")]
    pub product: String,
    /// Product revision level reported by INQUIRY.
    #[arg(long, default_value = "1.0")]
    pub revision: String,
    /// Steps to run in order: a CDB in hex (e.g. 1200002400), `remove`,
    /// `insert=<image>` or `complete`.
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        assert_eq!(
            "12 00 00 00 24 00".parse::<Step>().unwrap(),
            Step::Command(vec![0x12, 0, 0, 0, 0x24, 0])
        );
        assert_eq!(
            "4a01:0000:1000:0000:0800".parse::<Step>().unwrap(),
            Step::Command(vec![0x4a, 1, 0, 0, 0x10, 0, 0, 0, 8, 0])
        );
        assert_eq!("remove".parse::<Step>().unwrap(), Step::Remove);
        assert_eq!("complete".parse::<Step>().unwrap(), Step::Complete);
        assert_eq!(
            "insert=/tmp/disc.iso".parse::<Step>().unwrap(),
            Step::Insert("/tmp/disc.iso".into())
        );
    }

    #[test]
    fn test_parse_bad_steps() {
        for bad in ["", "123", "zz", "insert=", "eject"] {
            assert!(bad.parse::<Step>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_args() {
        let args = ScsiMmcArgs::try_parse_from([
            "scsi-mmc",
            "--image",
            "disc.iso",
            "--vendor",
            "ACME",
            "0000000000",
            "remove",
        ])
        .unwrap();
        assert_eq!(args.image, Some("disc.iso".into()));
        assert_eq!(args.vendor, "ACME");
        assert_eq!(args.product, "CD-ROM");
        assert_eq!(args.steps, [Step::Command(vec![0; 5]), Step::Remove]);
    }
}
