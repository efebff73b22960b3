//! Per-process topology identity.
//!
//! The node id is NOT discovered from hardware. It is parsed from the
//! hostname with a fixed cluster naming convention (`<a>-<b>-<c>-<node>...`),
//! and that parse is a hard compatibility contract:
//!
//! - scan left to right counting `-`;
//! - after the third `-`, skip to the first ASCII digit (later dashes are
//!   skipped like any other non-digit), then collect consecutive digits,
//!   stopping at the first non-digit;
//! - a `.` ends the scan at any point;
//! - parse the digits as a decimal integer.
//!
//! `compute-a1-b2-x7.cluster.local` is node 7. Fewer than three dashes
//! before the first `.` (or the end), or no digits between the third dash
//! and the next `.`, yields node id 0.

use std::fs;

use tracing::debug;

use crate::error::Result;
use crate::pairs::Rank;
use crate::transport::Messenger;

/// Identity of one participant. Built once at startup and kept for the
/// whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub rank: Rank,
    /// Core the process was running on when probed.
    pub core_id: i64,
    /// NUMA node of `core_id` (the "node grouping id" in reports).
    pub numa_node: i64,
    /// Logical node id parsed from the hostname.
    pub node_id: i64,
}

/// Where the process runs, as reported by the OS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreLocation {
    pub core_id: i64,
    pub numa_node: i64,
}

const WIRE_LEN: usize = 4;

impl ProcessIdentity {
    fn to_wire(self) -> [i64; WIRE_LEN] {
        [self.rank as i64, self.core_id, self.numa_node, self.node_id]
    }

    fn from_wire(wire: &[i64; WIRE_LEN]) -> Self {
        Self {
            rank: wire[0] as Rank,
            core_id: wire[1],
            numa_node: wire[2],
            node_id: wire[3],
        }
    }

    /// One fixed-format console line.
    pub fn report_line(&self) -> String {
        format!(
            "rank {:4} core {:4} numa {:2} node {:4}",
            self.rank, self.core_id, self.numa_node, self.node_id
        )
    }
}

/// Parse the node id from a hostname. See the module docs for the rule.
pub fn parse_node_id(hostname: &str) -> i64 {
    let mut dashes = 0;
    let mut digits = String::new();
    for c in hostname.chars() {
        if c == '.' {
            break;
        }
        if dashes < 3 {
            if c == '-' {
                dashes += 1;
            }
        } else if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse::<i64>().unwrap_or(0)
}

/// Build the local identity from already-probed OS facts.
pub fn identify(rank: Rank, hostname: &str, location: CoreLocation) -> ProcessIdentity {
    ProcessIdentity {
        rank,
        core_id: location.core_id,
        numa_node: location.numa_node,
        node_id: parse_node_id(hostname),
    }
}

/// Query hostname and current core from the OS and build the identity.
pub fn probe(rank: Rank) -> ProcessIdentity {
    let hostname = gethostname::gethostname();
    let hostname = hostname.to_string_lossy();
    let identity = identify(rank, &hostname, current_location());
    debug!(rank, %hostname, ?identity, "probed identity");
    identity
}

/// Core and NUMA node the calling thread currently runs on. Unknown values
/// are reported as 0.
pub fn current_location() -> CoreLocation {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        return CoreLocation::default();
    }
    let core_id = cpu as usize;
    CoreLocation {
        core_id: core_id as i64,
        numa_node: numa_node_of(core_id).map_or(0, |n| n as i64),
    }
}

/// Parse a cpulist string like "0-15,32-47" into a sorted Vec of core IDs.
fn parse_cpulist(s: &str) -> Vec<usize> {
    let mut cores = Vec::new();
    for part in s.trim().split(',') {
        let part = part.trim();
        if let Some((a, b)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (a.parse::<usize>(), b.parse::<usize>()) {
                cores.extend(start..=end);
            }
        } else if let Ok(c) = part.parse::<usize>() {
            cores.push(c);
        }
    }
    cores.sort_unstable();
    cores.dedup();
    cores
}

fn numa_node_of(core_id: usize) -> Option<usize> {
    let entries = fs::read_dir("/sys/devices/system/node").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(node) = name
            .strip_prefix("node")
            .and_then(|s| s.parse::<usize>().ok())
        else {
            continue;
        };
        let cpulist = entry.path().join("cpulist");
        if let Ok(s) = fs::read_to_string(cpulist)
            && parse_cpulist(&s).binary_search(&core_id).is_ok()
        {
            return Some(node);
        }
    }
    None
}

/// Gather every participant's identity on `coordinator`, indexed by rank.
///
/// The coordinator receives from the other ranks in increasing rank order,
/// one blocking receive each. Everyone else sends once and gets `None`.
pub fn collect_all<M: Messenger>(
    messenger: &M,
    local: ProcessIdentity,
    coordinator: Rank,
) -> Result<Option<Vec<ProcessIdentity>>> {
    let rank = messenger.rank();
    if rank != coordinator {
        messenger.send_ints(coordinator, &local.to_wire())?;
        return Ok(None);
    }

    let mut all = Vec::with_capacity(messenger.size());
    for src in 0..messenger.size() {
        if src == coordinator {
            all.push(local);
            continue;
        }
        let mut wire = [0i64; WIRE_LEN];
        messenger.receive_ints(src, &mut wire)?;
        all.push(ProcessIdentity::from_wire(&wire));
    }
    Ok(Some(all))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_id_convention() {
        assert_eq!(parse_node_id("compute-a1-b2-x7.cluster.local"), 7);
        assert_eq!(parse_node_id("compute-a1-b2-7.cluster.local"), 7);
        assert_eq!(parse_node_id("ib-rack2-row1-cn0113"), 113);
        assert_eq!(parse_node_id("compute-a1-b2-042"), 42);
        assert_eq!(parse_node_id("c-1-2-15x3"), 15);
    }

    #[test]
    fn test_parse_node_id_skips_dashes_before_digits() {
        assert_eq!(parse_node_id("a-b-c-x-7"), 7);
        assert_eq!(parse_node_id("a-b-c--12.site"), 12);
        assert_eq!(parse_node_id("a-b-c-x-y.7"), 0);
        // A dash after the digits ends them.
        assert_eq!(parse_node_id("a-b-c-4-9"), 4);
    }

    #[test]
    fn test_parse_node_id_defaults_to_zero() {
        assert_eq!(parse_node_id("host1.local"), 0);
        assert_eq!(parse_node_id(""), 0);
        assert_eq!(parse_node_id("a-b-c"), 0);
        assert_eq!(parse_node_id("a-b-c-"), 0);
        assert_eq!(parse_node_id("a-b.c-d-12"), 0);
        assert_eq!(parse_node_id("a-b-c-.12"), 0);
        assert_eq!(parse_node_id("a-b-c-node.7"), 0);
    }

    #[test]
    fn test_parse_node_id_overflow_is_zero() {
        assert_eq!(parse_node_id("a-b-c-99999999999999999999999"), 0);
    }

    #[test]
    fn test_fourth_dash_stops_digits() {
        assert_eq!(parse_node_id("a-b-c-12-34"), 12);
    }

    #[test]
    fn test_identify_keeps_location() {
        let id = identify(
            5,
            "rack-a-b-3.example",
            CoreLocation {
                core_id: 11,
                numa_node: 1,
            },
        );
        assert_eq!(
            id,
            ProcessIdentity {
                rank: 5,
                core_id: 11,
                numa_node: 1,
                node_id: 3,
            }
        );
    }

    #[test]
    fn test_wire_roundtrip_and_report() {
        let id = ProcessIdentity {
            rank: 2,
            core_id: 17,
            numa_node: 1,
            node_id: 304,
        };
        assert_eq!(ProcessIdentity::from_wire(&id.to_wire()), id);
        assert_eq!(id.report_line(), "rank    2 core   17 numa  1 node  304");
    }

    #[test]
    fn test_parse_cpulist() {
        assert_eq!(parse_cpulist("0-3,8,10-11\n"), vec![0, 1, 2, 3, 8, 10, 11]);
        assert_eq!(parse_cpulist(""), Vec::<usize>::new());
    }
}
