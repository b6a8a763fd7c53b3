//! Header inspection for module files.
//!
//! Opening a library built for another platform or architecture fails with an
//! unhelpful loader message, or worse. The header is checked first so such
//! files are skipped with a precise reason.
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::plugin_system::error::ModuleLoadError;

// Enough for the PE header of any real linker output.
const HEADER_PROBE_LEN: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Elf,
    Pe,
    MachO,
    /// Mach-O universal ("fat") binary holding several architectures.
    MachOUniversal,
}

impl BinaryFormat {
    /// Format loadable by the running platform.
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            BinaryFormat::Pe
        } else if cfg!(target_vendor = "apple") {
            BinaryFormat::MachO
        } else {
            BinaryFormat::Elf
        }
    }

    fn family(self) -> Self {
        match self {
            BinaryFormat::MachOUniversal => BinaryFormat::MachO,
            other => other,
        }
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryFormat::Elf => "ELF",
            BinaryFormat::Pe => "PE",
            BinaryFormat::MachO => "Mach-O",
            BinaryFormat::MachOUniversal => "universal Mach-O",
        };
        f.write_str(name)
    }
}

/// What a module header says about the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryInfo {
    pub format: BinaryFormat,
    /// Architectures in `std::env::consts::ARCH` spelling. Unknown machine
    /// codes are kept as `unknown(0x..)`.
    pub architectures: Vec<String>,
}

impl BinaryInfo {
    /// Whether the running process could load this binary.
    pub fn is_loadable(&self) -> bool {
        self.format.family() == BinaryFormat::native().family()
            && self
                .architectures
                .iter()
                .any(|arch| arch == std::env::consts::ARCH)
    }

    /// Reject binaries the running process cannot load.
    pub fn check_loadable(&self, path: &Path) -> Result<(), ModuleLoadError> {
        let expected = BinaryFormat::native();
        if self.format.family() != expected.family() {
            return Err(ModuleLoadError::ForeignFormat {
                path: path.to_path_buf(),
                found: self.format,
                expected,
            });
        }
        if !self
            .architectures
            .iter()
            .any(|arch| arch == std::env::consts::ARCH)
        {
            return Err(ModuleLoadError::ArchitectureMismatch {
                path: path.to_path_buf(),
                found: self.architectures.join(", "),
                expected: std::env::consts::ARCH,
            });
        }
        Ok(())
    }
}

/// Read the header of `path` and identify it.
pub fn inspect_file(path: &Path) -> Result<BinaryInfo, ModuleLoadError> {
    let io_err = |source| ModuleLoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut bytes = Vec::new();
    File::open(path)
        .map_err(io_err)?
        .take(HEADER_PROBE_LEN)
        .read_to_end(&mut bytes)
        .map_err(io_err)?;
    inspect_bytes(&bytes).ok_or_else(|| ModuleLoadError::NotABinary {
        path: path.to_path_buf(),
    })
}

/// Identify a binary from its leading bytes. `None` if it is no known format.
pub fn inspect_bytes(bytes: &[u8]) -> Option<BinaryInfo> {
    match bytes.get(..4)? {
        [0x7F, b'E', b'L', b'F'] => inspect_elf(bytes),
        [b'M', b'Z', ..] => inspect_pe(bytes),
        [0xCA, 0xFE, 0xBA, 0xBE] => inspect_universal(bytes),
        [0xFE, 0xED, 0xFA, 0xCE | 0xCF] => inspect_macho(bytes, Endian::Big),
        [0xCE | 0xCF, 0xFA, 0xED, 0xFE] => inspect_macho(bytes, Endian::Little),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

fn read_u16(bytes: &[u8], offset: usize, endian: Endian) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(offset..offset + 2)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u16::from_le_bytes(raw),
        Endian::Big => u16::from_be_bytes(raw),
    })
}

fn read_u32(bytes: &[u8], offset: usize, endian: Endian) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u32::from_le_bytes(raw),
        Endian::Big => u32::from_be_bytes(raw),
    })
}

fn unknown(code: u32) -> String {
    format!("unknown(0x{code:x})")
}

fn inspect_elf(bytes: &[u8]) -> Option<BinaryInfo> {
    let is_64 = match bytes.get(4)? {
        1 => false,
        2 => true,
        _ => return None,
    };
    let endian = match bytes.get(5)? {
        1 => Endian::Little,
        2 => Endian::Big,
        _ => return None,
    };
    let machine = read_u16(bytes, 18, endian)?;
    let arch = match (machine, is_64) {
        (0x03, _) => "x86",
        (0x3E, _) => "x86_64",
        (0x28, _) => "arm",
        (0xB7, _) => "aarch64",
        (0x08, false) => "mips",
        (0x08, true) => "mips64",
        (0x14, _) => "powerpc",
        (0x15, _) => "powerpc64",
        (0x16, _) => "s390x",
        (0xF3, false) => "riscv32",
        (0xF3, true) => "riscv64",
        (0x102, _) => "loongarch64",
        _ => "",
    };
    let arch = if arch.is_empty() {
        unknown(machine.into())
    } else {
        arch.to_string()
    };
    Some(BinaryInfo {
        format: BinaryFormat::Elf,
        architectures: vec![arch],
    })
}

fn inspect_pe(bytes: &[u8]) -> Option<BinaryInfo> {
    let header = read_u32(bytes, 0x3C, Endian::Little)? as usize;
    if bytes.get(header..header + 4)? != b"PE\0\0" {
        return None;
    }
    let machine = read_u16(bytes, header + 4, Endian::Little)?;
    let arch = match machine {
        0x014C => "x86".to_string(),
        0x8664 => "x86_64".to_string(),
        0x01C0 | 0x01C4 => "arm".to_string(),
        0xAA64 => "aarch64".to_string(),
        other => unknown(other.into()),
    };
    Some(BinaryInfo {
        format: BinaryFormat::Pe,
        architectures: vec![arch],
    })
}

const CPU_ARCH_ABI64: u32 = 0x0100_0000;

fn macho_arch(cputype: u32) -> String {
    match cputype {
        7 => "x86".to_string(),
        c if c == 7 | CPU_ARCH_ABI64 => "x86_64".to_string(),
        12 => "arm".to_string(),
        c if c == 12 | CPU_ARCH_ABI64 => "aarch64".to_string(),
        18 => "powerpc".to_string(),
        c if c == 18 | CPU_ARCH_ABI64 => "powerpc64".to_string(),
        other => unknown(other),
    }
}

fn inspect_macho(bytes: &[u8], endian: Endian) -> Option<BinaryInfo> {
    let cputype = read_u32(bytes, 4, endian)?;
    Some(BinaryInfo {
        format: BinaryFormat::MachO,
        architectures: vec![macho_arch(cputype)],
    })
}

// Java class files share the 0xCAFEBABE magic; their version field reads as
// an implausibly large architecture count.
const MAX_FAT_ARCHS: u32 = 30;

fn inspect_universal(bytes: &[u8]) -> Option<BinaryInfo> {
    let count = read_u32(bytes, 4, Endian::Big)?;
    if count == 0 || count > MAX_FAT_ARCHS {
        return None;
    }
    let architectures = (0..count as usize)
        .map(|i| read_u32(bytes, 8 + i * 20, Endian::Big).map(macho_arch))
        .collect::<Option<Vec<_>>>()?;
    Some(BinaryInfo {
        format: BinaryFormat::MachOUniversal,
        architectures,
    })
}
