//! Tantivy schema definition for record projections

use tantivy::schema::{
    IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, FAST, INDEXED,
    STORED, STRING,
};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::Index;

/// Tokenizer used for scored text fields.
pub const TEXT_TOKENIZER: &str = "en_stem";

/// Field names for the search index
pub mod fields {
    pub const ID: &str = "id";
    pub const KIND: &str = "kind";
    pub const OWNER_ID: &str = "owner_id";
    pub const URL: &str = "url";
    pub const TITLE: &str = "title";
    pub const BODY: &str = "body";
    pub const TAG_IDS: &str = "tag_ids";
    pub const TAG_NAMES: &str = "tag_names";
    pub const CREATED_AT: &str = "created_at";
}

/// Build the Tantivy schema for record projections
pub fn build_schema() -> Schema {
    let mut schema_builder = SchemaBuilder::new();

    // Exact-match keys and filters
    schema_builder.add_text_field(fields::ID, STRING | STORED);
    schema_builder.add_text_field(fields::KIND, STRING | STORED);
    schema_builder.add_text_field(fields::OWNER_ID, STRING | STORED);
    schema_builder.add_text_field(fields::URL, STRING | STORED);
    schema_builder.add_text_field(fields::TAG_IDS, STRING | STORED);
    schema_builder.add_text_field(fields::TAG_NAMES, STRING | STORED);

    // Scored text, stored so hits can be rebuilt without the database
    let text_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TEXT_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    schema_builder.add_text_field(fields::TITLE, text_options.clone());
    schema_builder.add_text_field(fields::BODY, text_options);

    // Microseconds since the epoch; sort key
    schema_builder.add_i64_field(fields::CREATED_AT, INDEXED | STORED | FAST);

    schema_builder.build()
}

/// Register the English stemming tokenizer on an index
pub fn configure_tokenizers(index: &Index) {
    index.tokenizers().register(
        TEXT_TOKENIZER,
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build(),
    );
}
