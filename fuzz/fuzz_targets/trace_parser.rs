#![no_main]

use dozer::config::AnalysisConfig;
use dozer::parse::tokenize;
use dozer::pipeline::analyze_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);

    // Neither the tokenizer nor the full pipeline may panic on any input
    for (index, line) in input.lines().enumerate() {
        let _ = tokenize(index + 1, line);
    }
    let _ = analyze_str(&input, &AnalysisConfig::default());
});
