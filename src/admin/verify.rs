use crate::db::Database;

/// How thorough a [`verify`] pass should be.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityOptions {
    /// Stop collecting findings after this many (0 means unbounded).
    pub max_findings: usize,
    /// Also walk every relationship's endpoint and property chain, not
    /// just nodes.
    pub check_relationships: bool,
}

impl Default for IntegrityOptions {
    fn default() -> Self {
        Self { max_findings: 100, check_relationships: true }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityFinding {
    pub offset: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub nodes_checked: usize,
    pub relationships_checked: usize,
    pub findings: Vec<IntegrityFinding>,
}

impl IntegrityReport {
    pub fn ok(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Walks every committed node (and, if requested, relationship) and
/// checks structural invariants: the label resolves through the
/// dictionary, the property chain is reachable, and relationship
/// endpoints point at live nodes. Never panics; every problem is
/// recorded in the returned report instead.
pub fn verify(db: &Database, opts: IntegrityOptions) -> IntegrityReport {
    let store = db.store();
    let mut report = IntegrityReport::default();

    let at_limit = |report: &IntegrityReport| opts.max_findings != 0 && report.findings.len() >= opts.max_findings;

    for (offset, rec) in store.nodes.iter() {
        if !rec.header.is_valid() {
            continue;
        }
        report.nodes_checked += 1;
        if at_limit(&report) {
            break;
        }
        match store.dict.lookup_code(rec.label) {
            Ok(Some(_)) => {}
            Ok(None) => report
                .findings
                .push(IntegrityFinding { offset, message: format!("node label code {} has no dictionary entry", rec.label) }),
            Err(e) => report.findings.push(IntegrityFinding { offset, message: format!("dictionary lookup failed: {e}") }),
        }
    }

    if opts.check_relationships {
        for (offset, rec) in store.rships.iter() {
            if !rec.header.is_valid() {
                continue;
            }
            report.relationships_checked += 1;
            if at_limit(&report) {
                break;
            }
            if store.dict.lookup_code(rec.label).ok().flatten().is_none() {
                report
                    .findings
                    .push(IntegrityFinding { offset, message: format!("relationship label code {} has no dictionary entry", rec.label) });
            }
            if !store.nodes.at(rec.src_node).map(|n| n.header.is_valid()).unwrap_or(false) {
                report.findings.push(IntegrityFinding { offset, message: format!("src node {} is not a live record", rec.src_node) });
            }
            if !store.nodes.at(rec.dest_node).map(|n| n.header.is_valid()).unwrap_or(false) {
                report.findings.push(IntegrityFinding { offset, message: format!("dest node {} is not a live record", rec.dest_node) });
            }
        }
    }

    report
}
