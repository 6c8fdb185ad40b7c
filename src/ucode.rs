#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

// There are a lot of variations within the RSP ucodes that share a common GBI. Each variant
// here selects one command table.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Microcode {
    F3D,          // RSP SW 2.0X (SM64)
    F3DEX,        // F3DEX 1.XX (Star Fox 64)
    F3DEX2,       // F3DEX 2.XX (Zelda OoT)
    WaveRace,     // F3DEX variant (WaveRace)
    F3DEXT,       // RSP SW 2.0D EXT (Shadows of the Empire)
    DiddyKong,    // RSP SW 2.0 (Diddy Kong Racing)
    S2DEX,        // S2DEX 1.XX (Yoshi's Story)
    PerfectDark,  // RSP SW PD
    F3DEXBG,      // F3DEXBG 2.08 (Conker's Bad Fur Day)
    Naboo,        // Battle for Naboo
    Turbo3D,
    Unknown,
}

/// Known checksums of the first 3KiB of the ucode text, first match wins
static KNOWN_UCODES: &[(u32, Microcode)] = &[
    (0x006BD77F, Microcode::F3D),
    (0x07200895, Microcode::F3D),
    (0x3A1CBAC3, Microcode::F3D), // Super Mario 64 (U)
    (0xB54E7F93, Microcode::F3D), // Nintendo 64 demos
    (0xB62F900F, Microcode::F3D),
    (0xBC03E969, Microcode::F3D),
    (0xD5604971, Microcode::F3D),
    (0xD5D68B1F, Microcode::F3D),
    (0xD67C2F8B, Microcode::F3D),
    (0x5182F610, Microcode::F3D),
    (0x4165E1FD, Microcode::F3D),
    (0x6E4D50AF, Microcode::F3D),

    (0x05165579, Microcode::F3DEX),
    (0x05777C62, Microcode::F3DEX),
    (0x057E7C62, Microcode::F3DEX),
    (0x1118B3E0, Microcode::F3DEX),
    (0x1DE712FF, Microcode::F3DEX),
    (0x24CD885B, Microcode::F3DEX),
    (0x26A7879A, Microcode::F3DEX),
    (0xFB816260, Microcode::F3DEX),
    (0x2C7975D6, Microcode::F3DEX),
    (0x2D3FE3F1, Microcode::F3DEX),
    (0x339872A6, Microcode::F3DEX),
    (0x3FF1A4CA, Microcode::F3DEX),
    (0x4340AC9B, Microcode::F3DEX),
    (0x440CFAD6, Microcode::F3DEX),
    (0x4FE6DF78, Microcode::F3DEX),
    (0x5257CD2A, Microcode::F3DEX),
    (0x5414030C, Microcode::F3DEX),
    (0x5414030D, Microcode::F3DEX),
    (0x559FF7D4, Microcode::F3DEX),
    (0x5EF4E34A, Microcode::F3DEX),
    (0x6075E9EB, Microcode::F3DEX),
    (0x60C1DCC4, Microcode::F3DEX),
    (0x66C0B10A, Microcode::F3DEX),
    (0x6EAA1DA8, Microcode::F3DEX),
    (0x72A4F34E, Microcode::F3DEX),
    (0x73999A23, Microcode::F3DEX),
    (0x7DF75834, Microcode::F3DEX),
    (0x82F48073, Microcode::F3DEX),
    (0x841CE10F, Microcode::F3DEX),
    (0x863E1CA7, Microcode::F3DEX),
    (0x8D5735B2, Microcode::F3DEX),
    (0x8D5735B3, Microcode::F3DEX),
    (0x97D1B58A, Microcode::F3DEX),
    (0xB4577B9C, Microcode::F3DEX),
    (0xBE78677C, Microcode::F3DEX),
    (0xBED8B069, Microcode::F3DEX),
    (0xC3704E41, Microcode::F3DEX),
    (0xC99A4C6C, Microcode::F3DEX),
    (0xCEE7920F, Microcode::F3DEX),
    (0xD1663234, Microcode::F3DEX),
    (0xD2A9F59C, Microcode::F3DEX),
    (0xD41DB5F7, Microcode::F3DEX),
    (0xD57049A5, Microcode::F3DEX),
    (0xD802EC04, Microcode::F3DEX),
    (0xE9231DF2, Microcode::F3DEX),
    (0xEC040469, Microcode::F3DEX),
    (0xEF54EE35, Microcode::F3DEX),

    (0x03044B84, Microcode::F3DEX2),
    (0x030F4B84, Microcode::F3DEX2),
    (0x0FF79527, Microcode::F3DEX2),
    (0x1A1E18A0, Microcode::F3DEX2),
    (0x1A1E1920, Microcode::F3DEX2),
    (0x1A62DC2F, Microcode::F3DEX2),
    (0x21F91874, Microcode::F3DEX2), // Zelda OoT
    (0x6124A508, Microcode::F3DEX2),
    (0x630A61FB, Microcode::F3DEX2),
    (0x65201A09, Microcode::F3DEX2),
    (0x679E1205, Microcode::F3DEX2),
    (0x6D8F8F8A, Microcode::F3DEX2),
    (0x753BE4A5, Microcode::F3DEX2),
    (0xDA13AB96, Microcode::F3DEX2),
    (0xE65CB4AD, Microcode::F3DEX2),
    (0xE1290FA2, Microcode::F3DEX2),
    (0xDE7D67D4, Microcode::F3DEX2),
    (0x485ABFF2, Microcode::F3DEX2),
    (0x2B291027, Microcode::F3DEX2),
    (0x2F71D1D5, Microcode::F3DEX2),
    (0x2F7DD1D5, Microcode::F3DEX2),
    (0x93D11F7B, Microcode::F3DEX2),
    (0x93D11FFB, Microcode::F3DEX2),
    (0x93D1FF7B, Microcode::F3DEX2),
    (0x955117FB, Microcode::F3DEX2),
    (0xA2D0F88E, Microcode::F3DEX2),
    (0xAA86CB1D, Microcode::F3DEX2),
    (0xAAE4A5B9, Microcode::F3DEX2),
    (0xAD0A6292, Microcode::F3DEX2), // Nintendo 64 devkit f3dex2
    (0xAD0A6312, Microcode::F3DEX2),
    (0xBA65EA1E, Microcode::F3DEX2),
    (0xC901CE73, Microcode::F3DEX2),
    (0xCB8C9B6C, Microcode::F3DEX2),
    (0xCFA35A45, Microcode::F3DEX2),

    (0x63BE08B3, Microcode::DiddyKong),

    (0x1EA9E30F, Microcode::S2DEX),
    (0x74AF0A74, Microcode::S2DEX),
    (0x794C3E28, Microcode::S2DEX),
    (0x2B5A89C2, Microcode::S2DEX),
    (0xD20DEDBF, Microcode::S2DEX),

    (0x0BF36D36, Microcode::Naboo),

    (0x1F120BBB, Microcode::Turbo3D),
    (0xF9893F70, Microcode::Turbo3D),
    (0xFF372492, Microcode::Turbo3D),

    // known to exist but not supported
    (0x0D7BBFFB, Microcode::Unknown),
    (0x0FF795BF, Microcode::Unknown),
    (0x844B55B5, Microcode::Unknown),
    (0x8EC3E124, Microcode::Unknown),
    (0xD5C4DC96, Microcode::Unknown),
];

// F3DLP.Rej ucodes, perspective texture correction is not implemented by them
const NO_PERSPECTIVE: [u32; 3] = [0x8D5735B2, 0xB1821ED3, 0x1118B3E0];

impl Microcode {
    /// Sum of the first 3KiB of the ucode as big endian words. The last 1KiB sometimes
    /// contains trash, so it's excluded.
    pub fn checksum(ucode: &[u8]) -> u32 {
        ucode.chunks_exact(4)
             .take(3072 >> 2)
             .fold(0u32, |crc, w| crc.wrapping_add(u32::from_be_bytes([w[0], w[1], w[2], w[3]])))
    }

    pub fn identify(crc: u32) -> Microcode {
        KNOWN_UCODES.iter()
                    .find(|(known, _)| *known == crc)
                    .map_or(Microcode::Unknown, |(_, ucode)| *ucode)
    }

    /// Whether this ucode family can't do perspective correct texturing
    pub fn perspective_unsupported(crc: u32) -> bool {
        NO_PERSPECTIVE.contains(&crc)
    }

    /// Whether RDP triangles emitted by this ucode carry a mipmap level count, so that the
    /// second texture tile participates
    pub fn has_mipmap_triangles(&self) -> bool {
        matches!(self, Microcode::F3DEX2 | Microcode::F3DEXBG | Microcode::PerfectDark | Microcode::Naboo)
    }

    /// The display list flow opcodes (G_DL, G_ENDDL, G_MOVEWORD, ...) are laid out one of
    /// two ways
    pub fn is_f3dex2_family(&self) -> bool {
        matches!(self, Microcode::F3DEX2 | Microcode::F3DEXBG | Microcode::Naboo)
    }

    pub fn is_known(&self) -> bool {
        *self != Microcode::Unknown
    }

    /// Parse a ucode name as given on the command line
    pub fn from_name(name: &str) -> Option<Microcode> {
        let ucode = match name.to_ascii_lowercase().as_str() {
            "f3d"         => Microcode::F3D,
            "f3dex"       => Microcode::F3DEX,
            "f3dex2"      => Microcode::F3DEX2,
            "waverace"    => Microcode::WaveRace,
            "f3dext"      => Microcode::F3DEXT,
            "dkr"         => Microcode::DiddyKong,
            "s2dex"       => Microcode::S2DEX,
            "perfectdark" => Microcode::PerfectDark,
            "f3dexbg"     => Microcode::F3DEXBG,
            "naboo"       => Microcode::Naboo,
            "turbo3d"     => Microcode::Turbo3D,
            _ => return None,
        };
        Some(ucode)
    }
}
