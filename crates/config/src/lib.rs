use anyhow::{Context, Result};
use cacheprobe_diag::{board, Geometry, Grid, Verdict};
use serde::{Deserialize, Serialize};
use std::path::Path;

const CELL_BYTES: u64 = 8;
/// Address window claimed by each memory-mapped register.
const REGISTER_BYTES: u64 = 8;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryRange {
    pub base: u64,
    pub size: String, // e.g. "64 KiB"
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GeometryConfig {
    /// Cells (8 bytes each) per line.
    pub line_stride: usize,
    pub set_count: usize,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            line_stride: board::GEOMETRY.line_stride,
            set_count: board::GEOMETRY.set_count,
        }
    }
}

impl From<GeometryConfig> for Geometry {
    fn from(g: GeometryConfig) -> Self {
        Geometry::new(g.line_stride, g.set_count)
    }
}

/// Memory map of the board a diagnostic run is simulated on.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BoardDescriptor {
    pub name: String,
    pub uart_tx: u64,
    pub host_signal: u64,
    pub scratch: MemoryRange,
    #[serde(default)]
    pub geometry: GeometryConfig,
}

impl Default for BoardDescriptor {
    fn default() -> Self {
        Self {
            name: "reference".to_string(),
            uart_tx: board::UART_TX as u64,
            host_signal: board::HOST_SIGNAL as u64,
            scratch: MemoryRange {
                base: board::SCRATCH_BASE as u64,
                size: format!("{} KiB", board::SCRATCH_SIZE / 1024),
            },
            geometry: GeometryConfig::default(),
        }
    }
}

impl BoardDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open board descriptor at {:?}", path.as_ref()))?;
        let board: Self =
            serde_yaml::from_reader(f).context("Failed to parse Board Descriptor")?;
        board.validate()?;
        Ok(board)
    }

    pub fn scratch_size(&self) -> Result<u64> {
        parse_size(&self.scratch.size)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry.into()
    }

    pub fn validate(&self) -> Result<()> {
        if self.geometry.line_stride == 0 || self.geometry.set_count == 0 {
            anyhow::bail!("Geometry 'line_stride' and 'set_count' must be greater than zero");
        }
        if self
            .geometry
            .line_stride
            .checked_mul(self.geometry.set_count)
            .is_none()
        {
            anyhow::bail!(
                "Geometry {} x {} overflows the address space",
                self.geometry.line_stride,
                self.geometry.set_count
            );
        }

        if self.scratch.base % CELL_BYTES != 0 {
            anyhow::bail!(
                "Scratch base {:#x} is not aligned to {} bytes",
                self.scratch.base,
                CELL_BYTES
            );
        }

        let size = self.scratch_size()?;
        if size < CELL_BYTES {
            anyhow::bail!("Scratch region must hold at least one cell");
        }

        let windows = [
            ("scratch", self.scratch.base, size),
            ("uart_tx", self.uart_tx, REGISTER_BYTES),
            ("host_signal", self.host_signal, REGISTER_BYTES),
        ];
        let mut ends = Vec::with_capacity(windows.len());
        for (name, base, len) in windows {
            let end = base.checked_add(len).ok_or_else(|| {
                anyhow::anyhow!("'{}' at {:#x}+{:#x} runs past the address space", name, base, len)
            })?;
            ends.push((name, base, end));
        }
        for (i, &(a, a_start, a_end)) in ends.iter().enumerate() {
            for &(b, b_start, b_end) in &ends[i + 1..] {
                if a_start < b_end && b_start < a_end {
                    anyhow::bail!("'{}' at {:#x} overlaps '{}' at {:#x}", b, b_start, a, a_start);
                }
            }
        }

        Ok(())
    }

    /// Bytes of scratch a pass over `grid` touches, `None` if the span does
    /// not fit above the scratch base.
    pub fn grid_bytes(&self, grid: Grid) -> Option<u64> {
        let bytes = self
            .geometry()
            .span(grid)
            .and_then(|cells| (cells as u64).checked_mul(CELL_BYTES))?;
        self.scratch.base.checked_add(bytes)?;
        Some(bytes)
    }

    /// Rejects grids whose address span runs past the end of scratch.
    pub fn check_grid(&self, grid: Grid) -> Result<()> {
        let size = self.scratch_size()?;
        let needed = self
            .grid_bytes(grid)
            .ok_or_else(|| anyhow::anyhow!("Grid {}x{} overflows the address space", grid.sets, grid.lines))?;

        if needed > size {
            anyhow::bail!(
                "Grid of {} sets x {} lines needs {} bytes of scratch but '{}' has {}",
                grid.sets,
                grid.lines,
                needed,
                self.name,
                size
            );
        }
        Ok(())
    }
}

/// Overwrites one cell between the write and verify passes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CellFault {
    pub set: usize,
    pub line: usize,
    pub value: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub lines: usize,
    pub sets: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            lines: board::GRID.lines,
            sets: board::GRID.sets,
        }
    }
}

impl From<GridConfig> for Grid {
    fn from(g: GridConfig) -> Self {
        Grid::new(g.lines, g.sets)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
}

impl From<Verdict> for Outcome {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Pass => Outcome::Pass,
            Verdict::Fail => Outcome::Fail,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    #[serde(default)]
    pub board: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VerdictAssertion {
    pub expected_verdict: Outcome,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MismatchCountAssertion {
    pub expected_mismatches: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    UartContains(UartContainsAssertion),
    ExpectedVerdict(VerdictAssertion),
    ExpectedMismatches(MismatchCountAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub faults: Vec<CellFault>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.grid.lines == 0 || self.grid.sets == 0 {
            anyhow::bail!("Grid 'lines' and 'sets' must be greater than zero");
        }

        if let Some(board) = &self.inputs.board {
            if board.trim().is_empty() {
                anyhow::bail!("Input 'board' path cannot be empty");
            }
        }

        let grid: Grid = self.grid.into();
        for fault in &self.faults {
            if !grid.contains(fault.set, fault.line) {
                anyhow::bail!(
                    "Fault at set {} line {} lies outside the {}x{} grid",
                    fault.set,
                    fault.line,
                    grid.sets,
                    grid.lines
                );
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = normalize_size(size_str)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format '{}': {}", size_str, e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

// "64KiB" -> "64 KiB"
fn normalize_size(size_str: &str) -> String {
    let trimmed = size_str.trim();
    match trimmed.find(|c: char| !(c.is_ascii_digit() || c == '.')) {
        Some(idx) => format!("{} {}", &trimmed[..idx], trimmed[idx..].trim_start()),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  board: "boards/reference.yaml"
grid:
  lines: 10
  sets: 10
faults:
  - { set: 2, line: 3, value: 99 }
assertions:
  - uart_contains: "99 = 3 * 4"
  - expected_verdict: fail
  - expected_mismatches: 1
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        assert!(script.validate().is_ok());
        assert_eq!(script.inputs.board.as_deref(), Some("boards/reference.yaml"));
        assert_eq!(script.faults, vec![CellFault { set: 2, line: 3, value: 99 }]);
        assert_eq!(script.assertions.len(), 3);
        assert!(matches!(
            script.assertions[1],
            TestAssertion::ExpectedVerdict(VerdictAssertion {
                expected_verdict: Outcome::Fail
            })
        ));
        assert!(matches!(
            script.assertions[2],
            TestAssertion::ExpectedMismatches(MismatchCountAssertion {
                expected_mismatches: 1
            })
        ));
    }

    #[test]
    fn test_minimal_script_uses_reference_grid() {
        let script: TestScript = serde_yaml::from_str("schema_version: \"1.0\"\n").unwrap();
        assert!(script.validate().is_ok());
        assert_eq!(Grid::from(script.grid), board::GRID);
        assert!(script.inputs.board.is_none());
        assert!(script.faults.is_empty());
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_zero_grid() {
        let yaml = r#"
schema_version: "1.0"
grid:
  lines: 0
  sets: 4
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("Grid"));
    }

    #[test]
    fn test_fault_outside_grid() {
        let yaml = r#"
schema_version: "1.0"
grid:
  lines: 4
  sets: 4
faults:
  - { set: 4, line: 0, value: 1 }
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_steps: 10
"#;
        assert!(serde_yaml::from_str::<TestScript>(yaml).is_err());
    }

    #[test]
    fn test_board_descriptor_yaml() {
        let yaml = r#"
name: "small"
uart_tx: 0x100000
host_signal: 0x1000
scratch:
  base: 0x10000
  size: "4KiB"
geometry:
  line_stride: 2
  set_count: 16
"#;
        let board: BoardDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert!(board.validate().is_ok());
        assert_eq!(board.uart_tx, 0x10_0000);
        assert_eq!(board.scratch_size().unwrap(), 4096);
        assert_eq!(board.geometry(), Geometry::new(2, 16));
    }

    #[test]
    fn test_default_board_fits_reference_grid() {
        let board = BoardDescriptor::default();
        assert!(board.validate().is_ok());
        assert_eq!(board.scratch_size().unwrap(), 64 * 1024);
        assert!(board.check_grid(board::GRID).is_ok());
    }

    #[test]
    fn test_check_grid_rejects_overflowing_span() {
        let board = BoardDescriptor::default();
        // 64 sets of 256 cells need almost twice the default scratch.
        let err = board.check_grid(Grid::new(1, 64)).unwrap_err();
        assert!(err.to_string().contains("needs"));
    }

    #[test]
    fn test_register_overlapping_scratch_rejected() {
        let mut board = BoardDescriptor::default();
        board.host_signal = board.scratch.base + 8;
        let err = board.validate().unwrap_err();
        assert!(err.to_string().contains("host_signal"));
    }

    #[test]
    fn test_registers_sharing_a_window_rejected() {
        let mut board = BoardDescriptor::default();
        board.host_signal = board.uart_tx;
        let err = board.validate().unwrap_err();
        assert!(err.to_string().contains("overlaps"));

        // Distinct start addresses, overlapping 8-byte windows.
        board.host_signal = board.uart_tx + 4;
        assert!(board.validate().is_err());

        board.host_signal = board.uart_tx + 8;
        assert!(board.validate().is_ok());
    }

    #[test]
    fn test_register_window_reaching_into_scratch_rejected() {
        let mut board = BoardDescriptor::default();
        board.uart_tx = board.scratch.base - 4;
        let err = board.validate().unwrap_err();
        assert!(err.to_string().contains("uart_tx"));
    }

    #[test]
    fn test_scratch_past_end_of_address_space_rejected() {
        let mut board = BoardDescriptor::default();
        board.scratch.base = 0xFFFF_FFFF_FFFF_0000;
        let err = board.validate().unwrap_err();
        assert!(err.to_string().contains("address space"));

        board.uart_tx = u64::MAX - 3;
        board.scratch.base = board::SCRATCH_BASE as u64;
        assert!(board.validate().is_err());
    }

    #[test]
    fn test_geometry_overflow_rejected() {
        let mut board = BoardDescriptor::default();
        board.geometry = GeometryConfig {
            line_stride: 1 << 62,
            set_count: 8,
        };
        let err = board.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_grid_bytes() {
        let board = BoardDescriptor::default();
        // Last cell (9, 9) sits at 9 * 256 + 9 * 4 = 2340.
        assert_eq!(board.grid_bytes(board::GRID), Some(2341 * 8));

        let mut high = BoardDescriptor::default();
        high.scratch.base = u64::MAX - 0xFFFF;
        assert_eq!(high.grid_bytes(Grid::new(1, 64)), None);
        assert!(high.check_grid(Grid::new(1, 64)).is_err());
    }

    #[test]
    fn test_parse_size_with_and_without_space() {
        assert_eq!(parse_size("64 KiB").unwrap(), 65536);
        assert_eq!(parse_size("64KiB").unwrap(), 65536);
        assert!(parse_size("lots").is_err());
    }
}
