use std::fs;
use std::path::Path;
use std::sync::Arc;
use serde_json::{json, Map};
use tempfile::TempDir;
use corpusvert::core::config::{AlignedEntitySource, Config, FtsMode};
use corpusvert::core::error::{ErrorKind, Result};
use corpusvert::core::stats::RunSummary;
use corpusvert::core::types::Span;
use corpusvert::model::{Attribute, Document, Record, Segment, Token};
use corpusvert::schema::{AttributeSpec, AttributeType, CorpusSchema, LayerSpec, MediaSlot};
use corpusvert::writer::Verticalizer;

fn run(schema: CorpusSchema, config: Config, records: Vec<Record>) -> Result<(RunSummary, CorpusSchema)> {
    let mut verticalizer = Verticalizer::new(schema, config)?;
    let summary = verticalizer.run(records.into_iter().map(Ok))?;
    Ok((summary, verticalizer.into_schema()))
}

fn lines(dir: &Path, file: &str) -> Vec<String> {
    fs::read_to_string(dir.join(file))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn words(id: &str, forms: &[&str]) -> Segment {
    forms
        .iter()
        .enumerate()
        .fold(Segment::new(id), |segment, (n, form)| {
            segment.with_token(Token::new((n + 1).to_string(), form))
        })
}

#[test]
fn hello_world_ranges() {
    let dir = TempDir::new().unwrap();
    let segment = Segment::new("s1")
        .with_token(Token::new("1", "Hello"))
        .with_token(Token::new("2", "World").no_space_after());

    let (summary, _) = run(
        CorpusSchema::new(),
        Config::with_output_dir(dir.path()),
        vec![Record::segment(segment)],
    )
    .unwrap();

    assert_eq!(
        lines(dir.path(), "token.csv"),
        vec!["token_id\tform_id\tchar_range\tsegment_id", "1\t1\t[1,6)\ts1", "2\t2\t[7,12)\ts1"]
    );
    assert_eq!(lines(dir.path(), "segment.csv"), vec!["segment_id\tchar_range", "s1\t[1,12)"]);
    assert_eq!(lines(dir.path(), "token_form.csv"), vec!["form_id\tform", "1\tHello", "2\tWorld"]);
    assert_eq!(
        lines(dir.path(), "fts_vector.csv"),
        vec!["segment_id\tvector", "s1\t'1Hello':1 '1World':2"]
    );
    assert_eq!((summary.documents, summary.segments, summary.tokens), (1, 1, 2));
}

#[test]
fn stream_without_document_marker_yields_one_document() {
    let dir = TempDir::new().unwrap();
    let mut meta = Map::new();
    meta.insert("title".to_string(), json!("All"));
    let mut config = Config::with_output_dir(dir.path());
    config.default_document_meta = Some(meta);

    let records = vec![
        Record::segment(words("s1", &["one", "two"])),
        Record::segment(words("s2", &["three"])),
    ];
    let (summary, _) = run(CorpusSchema::new(), config, records).unwrap();

    assert_eq!(
        lines(dir.path(), "document.csv"),
        vec!["document_id\tchar_range\tmeta", "1\t[1,14)\t{\"title\":\"All\"}"]
    );
    assert_eq!(summary.documents, 1);
}

#[test]
fn empty_input_still_writes_the_fallback_document() {
    let dir = TempDir::new().unwrap();
    let (summary, _) = run(CorpusSchema::new(), Config::with_output_dir(dir.path()), Vec::new()).unwrap();
    assert_eq!(lines(dir.path(), "document.csv").len(), 2);
    assert_eq!(summary.tokens, 0);
}

#[test]
fn document_ranges_tile_their_segments() {
    let dir = TempDir::new().unwrap();
    let d1 = Arc::new(Document::new("d1"));
    let d2 = Arc::new(Document::new("d2"));
    let last = Segment::new("s3").with_token(Token::new("1", "ef").no_space_after());
    let records = vec![
        Record::new(words("s1", &["ab"]), &d1),
        Record::new(words("s2", &["cd"]), &d1),
        Record::new(last, &d2),
    ];
    run(CorpusSchema::new(), Config::with_output_dir(dir.path()), records).unwrap();

    assert_eq!(
        lines(dir.path(), "document.csv"),
        vec!["document_id\tchar_range\tmeta", "1\t[1,6)\t{}", "2\t[7,9)\t{}"]
    );
    assert_eq!(
        lines(dir.path(), "segment.csv"),
        vec!["segment_id\tchar_range", "s1\t[1,3)", "s2\t[4,6)", "s3\t[7,9)"]
    );
}

#[test]
fn documents_without_tokens_do_not_overlap_their_neighbours() {
    let dir = TempDir::new().unwrap();
    let d0 = Arc::new(Document::new("d0"));
    let d1 = Arc::new(Document::new("d1"));
    let d2 = Arc::new(Document::new("d2"));
    let d3 = Arc::new(Document::new("d3"));
    let records = vec![
        Record::new(words("s1", &["ab"]), &d0),
        Record::new(Segment::new("s2"), &d1),
        Record { segment: None, document: Some(d2) },
        Record::new(words("s3", &["cd"]), &d3),
    ];
    let (summary, _) = run(CorpusSchema::new(), Config::with_output_dir(dir.path()), records).unwrap();

    assert_eq!(
        lines(dir.path(), "document.csv"),
        vec!["document_id\tchar_range\tmeta", "1\t[1,3)\t{}", "2\t[4,5)\t{}", "3\t[5,6)\t{}", "4\t[6,8)\t{}"]
    );
    assert_eq!(
        lines(dir.path(), "segment.csv"),
        vec!["segment_id\tchar_range", "s1\t[1,3)", "s3\t[6,8)"]
    );
    assert_eq!(summary.documents, 4);
}

#[test]
fn repeated_strings_are_interned_once() {
    let dir = TempDir::new().unwrap();
    let records = vec![Record::segment(words("s1", &["the", "cat", "the"]))];
    run(CorpusSchema::new(), Config::with_output_dir(dir.path()), records).unwrap();

    assert_eq!(lines(dir.path(), "token_form.csv"), vec!["form_id\tform", "1\tthe", "2\tcat"]);
    let form_ids: Vec<String> = lines(dir.path(), "token.csv")[1..]
        .iter()
        .map(|row| row.split('\t').nth(1).unwrap().to_string())
        .collect();
    assert_eq!(form_ids, vec!["1", "2", "1"]);
}

#[test]
fn dependency_chain_is_nested() {
    let dir = TempDir::new().unwrap();
    let segment = Segment::new("s1")
        .with_token(Token::new("1", "a").with_attribute(Attribute::dependency("deprel", None, "root")))
        .with_token(Token::new("2", "b").with_attribute(Attribute::dependency("deprel", Some("1"), "amod")))
        .with_token(Token::new("3", "c").with_attribute(Attribute::dependency("deprel", Some("2"), "advmod")));

    let (summary, _) = run(
        CorpusSchema::new(),
        Config::with_output_dir(dir.path()),
        vec![Record::segment(segment)],
    )
    .unwrap();

    assert_eq!(
        lines(dir.path(), "deprel.csv"),
        vec![
            "head\tdependent\tudep\tleft_anchor\tright_anchor",
            "\t1\troot\t1\t7",
            "1\t2\tamod\t2\t6",
            "2\t3\tadvmod\t3\t5",
        ]
    );
    // Dependency attributes never become token columns
    assert_eq!(lines(dir.path(), "token.csv")[0], "token_id\tform_id\tchar_range\tsegment_id");
    assert_eq!(
        lines(dir.path(), "fts_vector.csv")[1],
        "s1\t'1a':1 '2root':1 '3root':1 '1b':2 '2amod':2 '3amod':2 '1c':3 '2advmod':3 '3advmod':3"
    );
    assert_eq!(summary.dependency_trees, 1);
    assert_eq!(summary.dependency_anomalies, 0);
}

#[test]
fn fallback_fts_skips_segments_with_edges() {
    let dir = TempDir::new().unwrap();
    let segment = Segment::new("s1")
        .with_token(Token::new("1", "a").with_attribute(Attribute::dependency("deprel", None, "root")));
    let mut config = Config::with_output_dir(dir.path());
    config.fts_mode = FtsMode::FallbackOnly;
    run(CorpusSchema::new(), config, vec![Record::segment(segment)]).unwrap();
    assert!(!dir.path().join("fts_vector.csv").exists());
}

#[test]
fn aligned_token_entities_collapse_runs() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("ne.tsv");
    fs::write(&reference, "id\tkind\tname\nE1\tPER\tAda\nE2\tLOC\tParis\n").unwrap();

    let schema = CorpusSchema::new().with_layer(
        "NamedEntity",
        LayerSpec::default()
            .with_attribute("kind", AttributeSpec::of_type(AttributeType::Labels))
            .with_attribute("name", AttributeSpec::of_type(AttributeType::Text)),
    );
    let config = Config::with_output_dir(dir.path().join("out"))
        .add_aligned_entity("NamedEntity", AlignedEntitySource::new(reference, "Token"));

    let keys = [Some("E1"), Some("E1"), Some("E1"), None, Some("E2")];
    let mut segment = Segment::new("s1");
    for (n, key) in keys.iter().enumerate() {
        let mut token = Token::new((n + 1).to_string(), "abc");
        if let Some(key) = key {
            token = token.with_attribute(Attribute::text("namedentity", key));
        }
        segment = segment.with_token(token);
    }

    let (_, schema) = run(schema, config, vec![Record::segment(segment)]).unwrap();
    let out = dir.path().join("out");

    assert_eq!(
        lines(&out, "namedentity.csv"),
        vec![
            "namedentity_id\tkind\tname_id\tchar_range",
            "1\t01\t1\t[1,12)",
            "2\t10\t2\t[17,20)",
        ]
    );
    assert_eq!(lines(&out, "namedentity_labels.csv"), vec!["bit\tlabel", "0\tPER", "1\tLOC"]);
    assert_eq!(lines(&out, "namedentity_name.csv"), vec!["name_id\tname", "1\tAda", "2\tParis"]);
    assert_eq!(lines(&out, "token.csv")[0], "token_id\tform_id\tchar_range\tsegment_id");
    assert_eq!(schema.layer_ci("namedentity").unwrap().nlabels, Some(2));
}

#[test]
fn aligned_segment_entities_cover_their_segments() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("turns.tsv");
    fs::write(&reference, "id\tspeaker\nT1\tA\nT2\tB\n").unwrap();

    let schema = CorpusSchema::new().with_layer(
        "Turn",
        LayerSpec::default().with_attribute("speaker", AttributeSpec::of_type(AttributeType::Categorical)),
    );
    let config = Config::with_output_dir(dir.path().join("out"))
        .add_aligned_entity("Turn", AlignedEntitySource::new(reference, "Segment"));

    let records = vec![
        Record::segment(words("s1", &["aa", "bb"]).with_attribute(Attribute::text("turn", "T1"))),
        Record::segment(words("s2", &["cc"]).with_attribute(Attribute::text("turn", "T1"))),
        Record::segment(words("s3", &["dd"]).with_attribute(Attribute::text("turn", "T2"))),
    ];
    let (_, schema) = run(schema, config, records).unwrap();
    let out = dir.path().join("out");

    assert_eq!(
        lines(&out, "turn.csv"),
        vec!["turn_id\tspeaker\tchar_range", "1\tA\t[1,9)", "2\tB\t[10,12)"]
    );
    assert_eq!(lines(&out, "segment.csv")[0], "segment_id\tchar_range");
    assert_eq!(
        schema.attribute("Turn", "speaker").unwrap().values,
        Some(vec!["A".to_string(), "B".to_string()])
    );
}

#[test]
fn unknown_aligned_key_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("ne.tsv");
    fs::write(&reference, "id\tname\nE1\tAda\n").unwrap();
    let schema = CorpusSchema::new().with_layer(
        "NamedEntity",
        LayerSpec::default().with_attribute("name", AttributeSpec::of_type(AttributeType::Text)),
    );
    let config = Config::with_output_dir(dir.path().join("out"))
        .add_aligned_entity("namedentity", AlignedEntitySource::new(reference, "Token"));
    let segment = Segment::new("s1")
        .with_token(Token::new("1", "x").with_attribute(Attribute::text("namedentity", "E9")));

    let err = run(schema, config, vec![Record::segment(segment)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn token_labels_are_padded_to_the_final_vocabulary() {
    let dir = TempDir::new().unwrap();
    let schema = CorpusSchema::new().with_layer(
        "Token",
        LayerSpec::default().with_attribute("feats", AttributeSpec::of_type(AttributeType::Labels)),
    );
    let segment = Segment::new("s1")
        .with_token(Token::new("1", "cat").with_attribute(Attribute::categorical("feats", "Number=Sing")))
        .with_token(Token::new("2", "dogs").with_attribute(Attribute::categorical("feats", "Number=Plur,Case=Nom")));

    let (summary, schema) = run(schema, Config::with_output_dir(dir.path()), vec![Record::segment(segment)]).unwrap();

    let rows = lines(dir.path(), "token.csv");
    assert_eq!(rows[0], "token_id\tform_id\tfeats\tchar_range\tsegment_id");
    assert_eq!(rows[1], "1\t1\t001\t[1,4)\ts1");
    assert_eq!(rows[2], "2\t2\t110\t[5,9)\ts1");
    assert_eq!(
        lines(dir.path(), "token_labels.csv"),
        vec!["bit\tlabel", "0\tNumber=Sing", "1\tNumber=Plur", "2\tCase=Nom"]
    );
    assert_eq!(summary.table("token").unwrap().nlabels, Some(3));
    assert_eq!(schema.layer_ci("token").unwrap().nlabels, Some(3));
}

#[test]
fn categorical_values_reach_the_schema() {
    let dir = TempDir::new().unwrap();
    let schema = CorpusSchema::new().with_layer(
        "Token",
        LayerSpec::default()
            .with_attribute("upos", AttributeSpec::of_type(AttributeType::Categorical))
            .with_attribute(
                "lang",
                AttributeSpec {
                    is_global: true,
                    ..AttributeSpec::of_type(AttributeType::Categorical)
                },
            ),
    );
    let segment = Segment::new("s1")
        .with_token(
            Token::new("1", "le")
                .with_attribute(Attribute::categorical("upos", "DET"))
                .with_attribute(Attribute::categorical("lang", "fr")),
        )
        .with_token(Token::new("2", "chat").with_attribute(Attribute::categorical("upos", "NOUN")));

    let (_, schema) = run(schema, Config::with_output_dir(dir.path()), vec![Record::segment(segment)]).unwrap();
    assert_eq!(
        schema.attribute("Token", "upos").unwrap().values,
        Some(vec!["DET".to_string(), "NOUN".to_string()])
    );
    assert_eq!(schema.attribute("Token", "lang").unwrap().values, None);
}

#[test]
fn attributes_after_the_freeze_are_dropped() {
    let dir = TempDir::new().unwrap();
    let later = Segment::new("s2")
        .with_token(Token::new("1", "new").with_attribute(Attribute::categorical("misc", "x")));
    let records = vec![Record::segment(words("s1", &["old"])), Record::segment(later)];
    let (summary, _) = run(CorpusSchema::new(), Config::with_output_dir(dir.path()), records).unwrap();

    let rows = lines(dir.path(), "token.csv");
    assert_eq!(rows[0], "token_id\tform_id\tchar_range\tsegment_id");
    assert_eq!(rows[2], "2\t2\t[5,8)\ts2");
    assert_eq!(summary.dropped_attributes.iter().collect::<Vec<_>>(), vec!["token.misc"]);
}

#[test]
fn segment_attributes_after_the_freeze_are_reported() {
    let dir = TempDir::new().unwrap();
    let first = words("s1", &["a"]).with_attribute(Attribute::categorical("speaker", "A"));
    let second = words("s2", &["b"])
        .with_attribute(Attribute::categorical("speaker", "B"))
        .with_attribute(Attribute::categorical("topic", "news"));
    let third = words("s3", &["c"]).with_attribute(Attribute::categorical("topic", "sport"));
    let records = vec![Record::segment(first), Record::segment(second), Record::segment(third)];
    let (summary, _) = run(CorpusSchema::new(), Config::with_output_dir(dir.path()), records).unwrap();

    assert_eq!(
        lines(dir.path(), "segment.csv"),
        vec!["segment_id\tchar_range\tspeaker", "s1\t[1,2)\tA", "s2\t[3,4)\tB", "s3\t[5,6)\t"]
    );
    assert_eq!(summary.dropped_attributes.iter().collect::<Vec<_>>(), vec!["segment.topic"]);
}

#[test]
fn frames_are_offset_per_document() {
    let dir = TempDir::new().unwrap();
    let d1 = Arc::new(Document::new("d1"));
    let d2 = Arc::new(Document::new("d2"));
    let s1 = Segment::new("s1")
        .with_token(Token::new("1", "a").with_frames(0, 10))
        .with_token(Token::new("2", "b").with_frames(10, 25));
    let s2 = Segment::new("s2").with_token(Token::new("1", "c").with_frames(0, 5));

    let (summary, _) = run(
        CorpusSchema::new(),
        Config::with_output_dir(dir.path()),
        vec![Record::new(s1, &d1), Record::new(s2, &d2)],
    )
    .unwrap();

    let tokens = lines(dir.path(), "token.csv");
    assert_eq!(tokens[0], "token_id\tform_id\tchar_range\tframe_range\tsegment_id");
    assert_eq!(tokens[3], "3\t3\t[5,6)\t[25,30)\ts2");
    assert_eq!(
        lines(dir.path(), "segment.csv"),
        vec!["segment_id\tchar_range\tframe_range", "s1\t[1,4)\t[0,25)", "s2\t[5,6)\t[25,30)"]
    );
    assert_eq!(
        lines(dir.path(), "document.csv"),
        vec![
            "document_id\tchar_range\tframe_range\tmeta",
            "1\t[1,4)\t[0,25)\t{}",
            "2\t[5,6)\t[25,30)\t{}",
        ]
    );
    assert_eq!(summary.document_frames["d1"], Span { low: 0, high: 25 });
    assert_eq!(summary.document_frames["d2"], Span { low: 25, high: 30 });
}

#[test]
fn required_media_slot_without_file_is_a_schema_error() {
    let dir = TempDir::new().unwrap();
    let mut schema = CorpusSchema::new();
    schema.meta.media_slots.insert(
        "audio".to_string(),
        MediaSlot {
            media_type: Some("audio".to_string()),
            is_optional: Some(false),
        },
    );
    let document = Arc::new(Document::new("d1"));
    let err = run(
        schema,
        Config::with_output_dir(dir.path()),
        vec![Record::new(words("s1", &["x"]), &document)],
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Schema);
}

#[test]
fn token_without_form_is_a_schema_error() {
    let dir = TempDir::new().unwrap();
    let segment = Segment::new("s1").with_token(Token {
        id: "1".to_string(),
        space_after: true,
        frame_range: None,
        attributes: vec![Attribute::categorical("upos", "X")],
    });
    let err = run(
        CorpusSchema::new(),
        Config::with_output_dir(dir.path()),
        vec![Record::segment(segment)],
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Schema);
}

#[test]
fn manifest_records_tables_and_checksums() {
    let dir = TempDir::new().unwrap();
    let (summary, _) = run(
        CorpusSchema::new(),
        Config::with_output_dir(dir.path()),
        vec![Record::segment(words("s1", &["a", "b"]))],
    )
    .unwrap();

    let manifest: RunSummary =
        serde_json::from_slice(&fs::read(dir.path().join("manifest.json")).unwrap()).unwrap();
    let token = manifest.table("token").unwrap();
    assert_eq!(token.rows, 2);
    assert_eq!(token.file, "token.csv");
    assert_eq!(token.checksum, crc32fast::hash(&fs::read(dir.path().join("token.csv")).unwrap()));
    assert_eq!(manifest.tables.len(), summary.tables.len());
    assert!(manifest.finished_at >= manifest.started_at);
}

#[test]
fn finished_run_rejects_more_records() {
    let dir = TempDir::new().unwrap();
    let mut verticalizer = Verticalizer::new(CorpusSchema::new(), Config::with_output_dir(dir.path())).unwrap();
    verticalizer.finish().unwrap();
    let err = verticalizer.push(Record::segment(words("s1", &["late"]))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert!(verticalizer.finish().is_err());
}
