use proptest::prelude::*;
use rerag_engine::config::Config;
use rerag_engine::rag::{decide, extract_new_targets, Decision, EndReason, RunState};

proptest! {
    #[test]
    fn test_valid_configs_always_load(
        log_level in "error|warn|info|debug|trace",
        default_provider in "ollama|openai|anthropic|gemini",
        temperature in 0.0..=2.0f64,
        top_k in 1..=50usize,
        max_recursions in 0..=10u32,
        context_window in 1..=20usize,
    ) {
        let toml = format!(
            "[core]\nlog_level = \"{}\"\n\n[llm]\ndefault_provider = \"{}\"\ntemperature = {:?}\n\n\
             [retrieval]\ntop_k = {}\n\n[rag]\nmax_recursions = {}\ncontext_window = {}\n",
            log_level, default_provider, temperature, top_k, max_recursions, context_window
        );

        let config = Config::from_toml_str(&toml).unwrap();
        prop_assert_eq!(config.core.log_level, log_level);
        prop_assert_eq!(config.llm.default_provider, default_provider);
        prop_assert_eq!(config.retrieval.top_k, top_k);
        prop_assert_eq!(config.rag.max_recursions, max_recursions);
        prop_assert_eq!(config.rag.context_window, context_window);
    }

    #[test]
    fn test_decision_never_continues_past_the_bound(
        max in 0..6u32,
        depth in 0..8u32,
        targets in prop::collection::vec("[a-z]{1,4}", 0..4),
    ) {
        let mut state = RunState::new("q", max);
        for _ in 0..depth {
            state.complete_retrieval();
        }
        state.record_targets(targets.clone());

        match decide(&state) {
            Decision::Continue => {
                prop_assert!(depth < max);
                prop_assert!(!targets.is_empty());
            }
            Decision::End(EndReason::NoNewTargets) => prop_assert!(targets.is_empty()),
            Decision::End(_) => {}
        }
    }

    #[test]
    fn test_extracted_targets_are_new_and_unique(
        names in prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..6),
        done in 0..6usize,
    ) {
        let texts: Vec<String> = names
            .iter()
            .map(|n| format!("「{}」を参照。https://example.com/{} を見る", n, n))
            .collect();
        let processed: Vec<String> = names.iter().take(done).cloned().collect();

        let found = extract_new_targets(&texts, &processed);

        let mut unique = found.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), found.len());
        for target in &found {
            prop_assert!(!processed.contains(target));
        }
        for name in names.iter().skip(done) {
            if !processed.contains(name) {
                prop_assert!(found.contains(name));
                let url = format!("https://example.com/{}", name);
                prop_assert!(found.contains(&url));
            }
        }
    }
}
