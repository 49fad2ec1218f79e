//! Test fixtures: a raw arXiv OAI record and the metadata parsed from it

use serde_json::{json, Value};

pub const RECORD_ID: &str = "206f479f-bb1e-49ff-96df-491d66769abc";

pub const RAW_ARXIV_RECORD: &str = r#"<record>
  <header>
    <identifier>oai:arXiv.org:0704.0001</identifier>
    <datestamp>2008-11-13</datestamp>
    <setSpec>physics:hep-ph</setSpec>
  </header>
  <metadata>
    <oai_dc:dc>
      <dc:title>Calculation of prompt diphoton production cross sections at Tevatron and LHC energies</dc:title>
      <dc:creator>Balazs, C.</dc:creator>
      <dc:creator>Berger, E. L.</dc:creator>
      <dc:subject>High Energy Physics - Phenomenology</dc:subject>
      <dc:date>2007-04-02</dc:date>
      <dc:identifier>http://arxiv.org/abs/0704.0001</dc:identifier>
    </oai_dc:dc>
  </metadata>
</record>"#;

/// Metadata the parser produces for `RAW_ARXIV_RECORD`.
pub fn parsed_arxiv_record() -> Value {
    json!({
        "title": "Calculation of prompt diphoton production cross sections at Tevatron and LHC energies",
        "authors": [
            {"name": "Balazs, C."},
            {"name": "Berger, E. L."}
        ],
        "keywords": ["High Energy Physics - Phenomenology"],
        "pubdate": "2007-04-02",
        "ids": {"arxiv": "0704.0001"}
    })
}

/// The same record after an upstream correction.
pub fn revised_arxiv_record() -> Value {
    let mut record = parsed_arxiv_record();
    record["authors"]
        .as_array_mut()
        .expect("authors is an array")
        .push(json!({"name": "Nadolsky, P. M."}));
    record
}
