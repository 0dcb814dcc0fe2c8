#![allow(dead_code)]

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;

use jobsync::NewJob;

/// A job already dispatched to the alphafold endpoint.
pub fn dispatched_job(external_job_id: &str) -> NewJob {
    NewJob {
        user_id: 42,
        title: format!("fold {}", external_job_id),
        pipeline: "alphafold".to_string(),
        parameters: Some(r#"{"db_preset":"reduced_dbs"}"#.to_string()),
        endpoint_id: Some("ep-alphafold".to_string()),
        external_job_id: Some(external_job_id.to_string()),
        ..Default::default()
    }
}

/// A job that has not been dispatched yet.
pub fn pending_job(pipeline: &str) -> NewJob {
    NewJob {
        user_id: 42,
        title: format!("{} run", pipeline),
        pipeline: pipeline.to_string(),
        ..Default::default()
    }
}

pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *content)
            .expect("Failed to append tar entry");
    }
    builder.into_inner().expect("Failed to finish tar")
}

pub fn gzip(raw: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).expect("Failed to gzip");
    encoder.finish().expect("Failed to finish gzip")
}

pub fn b64(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}
