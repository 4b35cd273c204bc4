//! Parser for `cockroach node status --decommission --format=csv` output
//!
//! The first row is a header. Data rows are read positionally: the header is
//! checked against the expected column names first, so a change in the
//! tool's output format fails loudly instead of silently reading the wrong
//! column.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};

use crdb_common::Error;

const ID: usize = 0;
const ADDRESS: usize = 1;
const IS_LIVE: usize = 8;
const REPLICAS: usize = 9;
const IS_DECOMMISSIONING: usize = 10;

/// Number of columns a row must have for every used index to exist
const MIN_COLUMNS: usize = IS_DECOMMISSIONING + 1;

/// One node as reported by the status command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatusRecord {
    /// Node id assigned by the cluster
    pub id: u32,
    /// Advertised RPC address (`host:port`)
    pub address: String,
    /// Whether the node currently holds a liveness lease
    pub is_live: bool,
    /// Number of replicas still stored on the node
    pub replica_count: u64,
    /// Whether the node has been marked for decommissioning
    pub is_decommissioning: bool,
}

/// Lazy, single-pass sequence of node status records
///
/// Iteration yields one `Result` per data row; a malformed row yields `Err`
/// and the caller decides whether to stop. Re-reading requires re-running
/// the command.
pub struct NodeStatusTable<R: Read> {
    records: StringRecordsIntoIter<R>,
}

impl<'a> NodeStatusTable<&'a [u8]> {
    /// Parse command output held in memory
    pub fn parse(text: &'a str) -> Result<Self, Error> {
        Self::from_reader(text.as_bytes())
    }
}

impl<R: Read> NodeStatusTable<R> {
    /// Read and validate the header, leaving data rows for iteration
    pub fn from_reader(reader: R) -> Result<Self, Error> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header = reader
            .headers()
            .map_err(|e| Error::parse_at(1, format!("unreadable header: {e}")))?;
        validate_header(header)?;

        Ok(Self {
            records: reader.into_records(),
        })
    }
}

impl<R: Read> Iterator for NodeStatusTable<R> {
    type Item = Result<NodeStatusRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(
            record
                .map_err(|e| {
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    Error::parse_at(line, format!("malformed row: {e}"))
                })
                .and_then(|r| parse_record(&r)),
        )
    }
}

fn validate_header(header: &StringRecord) -> Result<(), Error> {
    if header.is_empty() {
        return Err(Error::parse("empty node status output"));
    }
    if header.len() < MIN_COLUMNS {
        return Err(Error::parse_at(
            1,
            format!(
                "header has {} columns, expected at least {MIN_COLUMNS}",
                header.len()
            ),
        ));
    }

    let expect = |index: usize, accepted: &[&str]| -> Result<(), Error> {
        let found = &header[index];
        if accepted.contains(&found) {
            Ok(())
        } else {
            Err(Error::parse_at(
                1,
                format!("column {index} is {found:?}, expected one of {accepted:?}"),
            ))
        }
    };

    expect(ID, &["id"])?;
    expect(ADDRESS, &["address"])?;
    expect(IS_LIVE, &["is_live"])?;
    expect(REPLICAS, &["replicas", "gossiped_replicas"])?;
    expect(IS_DECOMMISSIONING, &["is_decommissioning"])
}

fn parse_record(record: &StringRecord) -> Result<NodeStatusRecord, Error> {
    let line = record.position().map(|p| p.line()).unwrap_or_default();

    if record.len() < MIN_COLUMNS {
        return Err(Error::parse_at(
            line,
            format!(
                "row has {} columns, expected at least {MIN_COLUMNS}",
                record.len()
            ),
        ));
    }

    let id = record[ID]
        .parse::<u32>()
        .map_err(|_| Error::parse_at(line, format!("invalid node id {:?}", &record[ID])))?;
    let replica_count = record[REPLICAS].parse::<u64>().map_err(|_| {
        Error::parse_at(
            line,
            format!("invalid replica count {:?} for node {id}", &record[REPLICAS]),
        )
    })?;

    Ok(NodeStatusRecord {
        id,
        address: record[ADDRESS].to_string(),
        is_live: &record[IS_LIVE] == "true",
        replica_count,
        is_decommissioning: &record[IS_DECOMMISSIONING] == "true",
    })
}
