//! In-memory document store
//!
//! Documents are indexed in a RAM-backed tantivy index whose text field is
//! split into lowercase character bigrams. Bigrams need no word segmenter,
//! so Japanese text ranks as sensibly as English. This stands in for a
//! vector store; it does not compute embeddings.

use async_trait::async_trait;
use sdk::{DocumentStore, EngineError, RetrievedDocument};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED,
};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer, TokenStream};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

const BIGRAM_TOKENIZER: &str = "bigram";
const WRITER_MEMORY_BYTES: usize = 15_000_000;

/// Searchable list of documents held in memory
#[derive(Clone)]
pub struct InMemoryStore {
    documents: Vec<RetrievedDocument>,
    index: Index,
    reader: IndexReader,
    content_field: Field,
    position_field: Field,
}

impl InMemoryStore {
    /// Index `documents` in memory.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the index cannot be built.
    pub fn new(documents: Vec<RetrievedDocument>) -> Result<Self, EngineError> {
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(BIGRAM_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqs);

        let mut schema_builder = Schema::builder();
        let content_field = schema_builder.add_text_field(
            "content",
            TextOptions::default().set_indexing_options(indexing),
        );
        // Index into `documents`; the text itself is not stored twice.
        let position_field = schema_builder.add_u64_field("position", STORED);

        let index = Index::create_in_ram(schema_builder.build());
        index
            .tokenizers()
            .register(BIGRAM_TOKENIZER, bigram_analyzer()?);

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(index_error)?;
        for (position, document) in documents.iter().enumerate() {
            writer
                .add_document(doc!(
                    content_field => document.text.as_str(),
                    position_field => position as u64
                ))
                .map_err(index_error)?;
        }
        writer.commit().map_err(index_error)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;

        Ok(Self {
            documents,
            index,
            reader,
            content_field,
            position_field,
        })
    }

    /// The built-in five-document corpus: a RAG guide chain and a vector
    /// database comparison chain, linked by bracket references and URLs.
    pub fn sample() -> Result<Self, EngineError> {
        let docs = [
            (
                "RAGシステムの基本的な仕組みについては、「RAG入門ガイド」を参照してください。",
                "rag_overview.md",
            ),
            (
                "RAG入門ガイド：RAGとは検索拡張生成の略で、LLMの回答精度を向上させる手法です。詳細はhttps://example.com/rag-guideをご覧ください。",
                "RAG入門ガイド",
            ),
            (
                "https://example.com/rag-guideの内容：RAGは大規模言語モデルに外部知識を統合する強力な手法です。ベクトルデータベースと組み合わせることで高精度な回答が可能になります。",
                "https://example.com/vector-db-benchmark",
            ),
            (
                "ベクトルデータベースの選定については「ベクトルDB比較表」を参照してください。",
                "vector_db_intro.md",
            ),
            (
                "ベクトルDB比較表：Chroma、Pinecone、Weaviateなどの主要なベクトルDBの比較。性能詳細はhttps://example.com/vector-db-benchmarkを参照。",
                "ベクトルDB比較表",
            ),
        ];

        Self::new(
            docs.iter()
                .map(|(text, source)| RetrievedDocument::new(*text).with_metadata("source", *source))
                .collect(),
        )
    }

    /// Load a JSON array of `{"text": ..., "metadata": {...}}` objects.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the file cannot be read or parsed,
    /// holds no documents, or cannot be indexed.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read corpus {}: {}", path.display(), e))
        })?;

        let documents: Vec<RetrievedDocument> = serde_json::from_str(&contents).map_err(|e| {
            EngineError::Config(format!("Failed to parse corpus {}: {}", path.display(), e))
        })?;

        if documents.is_empty() {
            return Err(EngineError::Config(format!(
                "Corpus {} contains no documents",
                path.display()
            )));
        }

        tracing::info!(
            "Loaded {} documents from {}",
            documents.len(),
            path.display()
        );
        Self::new(documents)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Up to `k` documents, best first.
    ///
    /// Always returns `min(k, len)` documents: once the matches run out the
    /// rest of the corpus follows in corpus order. Equal scores keep corpus
    /// order too.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, EngineError> {
        if k == 0 || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let matched = self
            .ranked_positions(query)
            .map_err(|e| EngineError::Retrieval(format!("Index search failed: {}", e)))?;

        let mut taken = vec![false; self.documents.len()];
        let mut results = Vec::with_capacity(k.min(self.documents.len()));
        for position in matched.into_iter().chain(0..self.documents.len()) {
            if results.len() == k {
                break;
            }
            if !std::mem::replace(&mut taken[position], true) {
                results.push(self.documents[position].clone());
            }
        }

        Ok(results)
    }

    /// Corpus positions of every document sharing a bigram with `query`,
    /// ordered by BM25 score then position.
    fn ranked_positions(&self, query: &str) -> tantivy::Result<Vec<usize>> {
        let clauses: Vec<(Occur, Box<dyn Query>)> = self
            .query_terms(query)?
            .into_iter()
            .map(|term| {
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(
            &BooleanQuery::new(clauses),
            &TopDocs::with_limit(self.documents.len()),
        )?;

        let mut scored = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(address)?;
            if let Some(position) = retrieved
                .get_first(self.position_field)
                .and_then(|v| v.as_u64())
            {
                scored.push((score, position as usize));
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        Ok(scored.into_iter().map(|(_, position)| position).collect())
    }

    /// Distinct bigram terms of `query`, produced by the field's own analyzer.
    fn query_terms(&self, query: &str) -> tantivy::Result<Vec<Term>> {
        let mut analyzer = self.index.tokenizer_for_field(self.content_field)?;
        let mut stream = analyzer.token_stream(query);

        let mut terms = Vec::new();
        while stream.advance() {
            let term = Term::from_field_text(self.content_field, &stream.token().text);
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        Ok(terms)
    }
}

fn bigram_analyzer() -> Result<TextAnalyzer, EngineError> {
    let tokenizer = NgramTokenizer::new(2, 2, false).map_err(index_error)?;
    Ok(TextAnalyzer::builder(tokenizer).filter(LowerCaser).build())
}

fn index_error(e: tantivy::TantivyError) -> EngineError {
    EngineError::Config(format!("Failed to build document index: {}", e))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, EngineError> {
        self.search(query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store(texts: &[&str]) -> InMemoryStore {
        InMemoryStore::new(texts.iter().map(|t| RetrievedDocument::new(*t)).collect()).unwrap()
    }

    fn texts(results: Vec<RetrievedDocument>) -> Vec<String> {
        results.into_iter().map(|d| d.text).collect()
    }

    #[test]
    fn test_search_ranks_by_overlap() {
        let store = store(&["cats and dogs", "vector databases", "vector indexes"]);
        let results = store.search("vector database", 2).unwrap();

        assert_eq!(texts(results), vec!["vector databases", "vector indexes"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let store = store(&["nothing here", "Vector Databases"]);
        let results = store.search("VECTOR", 1).unwrap();
        assert_eq!(results[0].text, "Vector Databases");
    }

    #[test]
    fn test_search_ranks_japanese_text() {
        let store = store(&["猫と犬の話", "料理のレシピ", "ベクトル検索の基礎"]);
        let results = store.search("ベクトル検索とは", 1).unwrap();
        assert_eq!(results[0].text, "ベクトル検索の基礎");
    }

    #[test]
    fn test_search_returns_min_of_k_and_len() {
        let store = store(&["a", "b", "c"]);
        assert_eq!(store.search("zzz", 10).unwrap().len(), 3);
        assert_eq!(store.search("zzz", 2).unwrap().len(), 2);
        assert!(store.search("zzz", 0).unwrap().is_empty());
    }

    #[test]
    fn test_unmatched_documents_fill_in_corpus_order() {
        let store = store(&["alpha", "beta", "vector store", "gamma"]);
        let results = store.search("vector", 3).unwrap();
        assert_eq!(texts(results), vec!["vector store", "alpha", "beta"]);
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let store = store(&["first", "second", "third"]);
        assert_eq!(
            texts(store.search("qq", 3).unwrap()),
            vec!["first", "second", "third"]
        );
    }

    fn store_with_twins() -> InMemoryStore {
        InMemoryStore::new(vec![
            RetrievedDocument::new("other").with_metadata("source", "0"),
            RetrievedDocument::new("same text").with_metadata("source", "1"),
            RetrievedDocument::new("same text").with_metadata("source", "2"),
        ])
        .unwrap()
    }

    #[test]
    fn test_twins_rank_by_position() {
        let results = store_with_twins().search("same text", 2).unwrap();
        assert_eq!(results[0].source(), Some("1"));
        assert_eq!(results[1].source(), Some("2"));
    }

    #[test]
    fn test_query_syntax_is_not_interpreted() {
        let store = store(&["a (b) c", "title:x AND y"]);
        assert_eq!(store.search("title:x AND \"(", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_store() {
        let store = store(&[]);
        assert!(store.is_empty());
        assert!(store.search("anything", 3).unwrap().is_empty());
    }

    #[test]
    fn test_sample_corpus() {
        let store = InMemoryStore::sample().unwrap();
        assert_eq!(store.len(), 5);

        let mut sources: Vec<_> = store
            .search("ベクトルDB比較表", 2)
            .unwrap()
            .iter()
            .filter_map(|d| d.source().map(str::to_string))
            .collect();
        sources.sort();
        assert_eq!(sources, vec!["vector_db_intro.md", "ベクトルDB比較表"]);
    }

    #[tokio::test]
    async fn test_similarity_search_uses_default_k() {
        let store = InMemoryStore::sample().unwrap();
        let results = store
            .similarity_search("RAGシステムの仕組みとベクトルデータベースの選定について教えてください。", 4)
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"text": "doc one", "metadata": {{"source": "one.md"}}}}, {{"text": "doc two"}}]"#
        )
        .unwrap();

        let store = InMemoryStore::load_from_path(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.search("doc one", 1).unwrap()[0].source(), Some("one.md"));
    }

    #[test]
    fn test_load_rejects_bad_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            InMemoryStore::load_from_path(file.path()),
            Err(EngineError::Config(_))
        ));

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        assert!(matches!(
            InMemoryStore::load_from_path(empty.path()),
            Err(EngineError::Config(_))
        ));

        assert!(InMemoryStore::load_from_path(Path::new("/nonexistent/corpus.json")).is_err());
    }
}
