use anyhow::Context;
use contact_etl::{CliConfig, ContactPipeline, EtlEngine, LocalStorage, TomlConfig};
use httpmock::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn cli_config(input: &str, search_url: String) -> CliConfig {
    CliConfig {
        input: input.to_string(),
        output_path: "out".to_string(),
        output_prefix: "contacts".to_string(),
        lookup_files: vec![],
        workers: 1,
        delay_ms: 0,
        strict: false,
        ai: false,
        ai_model: "gemini-2.0-flash-lite-001".to_string(),
        no_homepage: false,
        no_search: false,
        discover_homepage: false,
        reverse_lookup: false,
        search_url,
        timeout_seconds: 5,
        batch_size: 0,
        max_records: None,
        compress: false,
        log_file: None,
        verbose: false,
        monitor: false,
    }
}

fn read_output(dir: &Path, relative: &str) -> anyhow::Result<String> {
    let bytes = std::fs::read(dir.join(relative)).with_context(|| format!("reading {}", relative))?;
    let text = String::from_utf8(bytes)?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn read_zip_entry(path: &Path, name: &str) -> anyhow::Result<String> {
    let zip_data = std::fs::read(path)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    let mut file = archive.by_name(name)?;
    let mut content = String::new();
    std::io::Read::read_to_string(&mut file, &mut content)?;
    Ok(content)
}

#[tokio::test]
async fn test_end_to_end_homepage_and_search() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();

    let homepage = server.mock(|when, then| {
        when.method(GET).path("/jongno");
        then.status(200).body(
            "<html><head><script>var fax = 'FAX 02-000-0000';</script></head><body>\
             <div>전화 02-2148-1114 / 팩스 02-2148-1190</div></body></html>",
        );
    });
    let search = server.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(200)
            .body("<div>삼청동 주민센터 전화 02-2148-5100 팩스 02-2148-5109</div>");
    });

    let input = format!(
        "기관명,주소,전화번호,팩스번호,홈페이지\n\
         종로구청,서울특별시 종로구 삼봉로 43,02-2148-1114,,{}\n\
         삼청동,서울특별시 종로구 삼청로 102,02-2148-5100,,\n",
        server.url("/jongno")
    );
    std::fs::write(temp_dir.path().join("input.csv"), input)?;

    let config = cli_config("input.csv", format!("{}?q={{query}}", server.url("/search")));
    let storage = LocalStorage::new(temp_dir.path());
    let pipeline = ContactPipeline::from_config(storage, config)?;
    let engine = EtlEngine::new_with_monitoring(pipeline, false);

    let output_path = engine.run().await?;
    assert!(output_path.starts_with("out/contacts_"));
    assert!(output_path.ends_with(".csv"));

    homepage.assert();
    search.assert_hits(2);

    let csv = read_output(temp_dir.path(), &output_path)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("추출_팩스번호"));
    assert!(lines[1].contains("02-2148-1190"));
    assert!(lines[1].contains("homepage"));
    assert!(!lines[1].contains("02-000-0000"));
    assert!(lines[2].contains("02-2148-5109"));
    assert!(lines[2].contains("search"));

    let totals = engine.totals();
    assert_eq!(totals.processed, 2);
    assert_eq!(totals.faxes, 2);
    assert_eq!(totals.errors, 0);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_homepage_is_recorded_per_row() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();
    let broken = server.mock(|when, then| {
        when.method(GET).path("/down");
        then.status(503);
    });

    let input = format!(
        "교회명,주소,전화번호,팩스번호,홈페이지\n사랑교회,서울특별시 서초구,02-3479-7114,,{}\n",
        server.url("/down")
    );
    std::fs::write(temp_dir.path().join("church.csv"), input)?;

    let mut config = cli_config("church.csv", format!("{}?q={{query}}", server.url("/search")));
    config.no_search = true;
    let pipeline = ContactPipeline::from_config(LocalStorage::new(temp_dir.path()), config)?;
    let engine = EtlEngine::new(pipeline);

    let output_path = engine.run().await?;
    broken.assert();

    let csv = read_output(temp_dir.path(), &output_path)?;
    assert!(csv.contains("503"));
    assert_eq!(engine.totals().errors, 1);
    Ok(())
}

#[tokio::test]
async fn test_reference_lookup_with_workers() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let input = "기관명,주소,전화번호,팩스번호\n\
        청운효자동,서울특별시 종로구,02-2148-5033,02-2148-5039\n\
        사직동,서울특별시 종로구,02-2148-5044,\n\
        삼청동,서울특별시 종로구,02-2148-5100,02-2148-5109\n\
        부암동,서울특별시 종로구,,\n";
    std::fs::write(temp_dir.path().join("centers.csv"), input)?;
    std::fs::write(
        temp_dir.path().join("ref.csv"),
        "sido,gugun,center_name,phone,fax\n\
         서울,종로구,청운효자동 주민센터,02-2148-5033,02-2148-5039\n\
         서울,종로구,사직동 주민센터,02-2148-5040,02-2148-5044\n",
    )?;

    let mut config = cli_config("centers.csv", "http://127.0.0.1:9/?q={query}".to_string());
    config.lookup_files = vec!["ref.csv".to_string()];
    config.workers = 2;
    config.no_homepage = true;
    config.no_search = true;
    config.compress = true;

    let pipeline = ContactPipeline::from_config(LocalStorage::new(temp_dir.path()), config)?;
    let stamp = pipeline.run_stamp().to_string();
    let engine = EtlEngine::new(pipeline);
    let output_path = engine.run().await?;
    assert_eq!(output_path, format!("out/contacts_{}.zip", stamp));

    // 每個 worker 各自輸出
    for worker in 1..=2 {
        let name = format!("out/contacts_worker{}_{}.csv", worker, stamp);
        assert!(temp_dir.path().join(&name).exists(), "missing {}", name);
    }

    let csv = read_zip_entry(
        &temp_dir.path().join(&output_path),
        &format!("contacts_{}.csv", stamp),
    )?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[1].contains("청운효자동") && lines[1].contains(",100,"));
    // 전화번호가 참조 데이터의 팩스번호
    assert!(lines[2].contains("사직동") && lines[2].contains("팩스번호입니다"));
    assert!(lines[2].contains(",80,"));
    assert!(lines[4].starts_with("부암동"));

    let totals = engine.totals();
    assert_eq!(totals.references, 2);
    Ok(())
}

#[tokio::test]
async fn test_toml_config_with_gemini_fallback() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();
    std::env::set_var("CONTACT_ETL_IT_GEMINI_KEY", "it-key");

    let homepage = server.mock(|when, then| {
        when.method(GET).path("/church");
        then.status(200)
            .body("<p>수원중앙교회</p><p>TEL 031-228-2114</p><p>오시는 길</p>");
    });
    let gemini = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-2.0-flash-lite-001:generateContent")
            .query_param("key", "it-key");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "text": "```json\n{\"phone\": \"031-228-2114\", \"fax\": \"031-228-2999\"}\n```" }]
                    }
                }]
            }));
    });

    let input = format!(
        "교회명,주소,전화번호,홈페이지\n수원중앙교회,경기도 수원시 팔달구,031-228-2114,{}\n",
        server.url("/church")
    );
    std::fs::write(temp_dir.path().join("church.csv"), input)?;

    let toml_content = format!(
        r#"
[pipeline]
name = "church-fax"

[source]
input = "church.csv"
timeout_seconds = 5

[extract]
delay_ms = 0
use_search = false

[ai]
enabled = true
endpoint = "{}"
api_key_envs = ["CONTACT_ETL_IT_GEMINI_KEY"]

[load]
output_path = "out"
output_prefix = "church"
"#,
        server.base_url()
    );
    let config = TomlConfig::from_toml_str(&toml_content)?;

    let pipeline = ContactPipeline::from_config(LocalStorage::new(temp_dir.path()), config)?;
    let engine = EtlEngine::new(pipeline);
    let output_path = engine.run().await?;

    homepage.assert();
    gemini.assert();

    let csv = read_output(temp_dir.path(), &output_path)?;
    let row = csv.lines().nth(1).context("result row missing")?;
    assert!(row.contains("031-228-2999"));
    assert!(row.contains(",ai,"));
    assert_eq!(engine.totals().faxes, 1);

    std::env::remove_var("CONTACT_ETL_IT_GEMINI_KEY");
    Ok(())
}

#[tokio::test]
async fn test_reverse_lookup_fills_owner_columns() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();
    let search = server.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(200)
            .body("<div>삼청동주민센터 전화 02-2148-5100 팩스 02-2148-5109</div>");
    });

    std::fs::write(
        temp_dir.path().join("centers.csv"),
        "기관명,주소,전화번호,팩스번호\n삼청동,서울특별시 종로구 삼청로 102,,\n",
    )?;

    let mut config = cli_config("centers.csv", format!("{}?q={{query}}", server.url("/search")));
    config.no_homepage = true;
    config.reverse_lookup = true;
    let pipeline = ContactPipeline::from_config(LocalStorage::new(temp_dir.path()), config)?;
    let engine = EtlEngine::new(pipeline);
    let output_path = engine.run().await?;

    // 팩스/전화 검색 두 번, 기관명 역검색 두 번
    search.assert_hits(4);

    let csv = read_output(temp_dir.path(), &output_path)?;
    let header = csv.lines().next().context("header missing")?;
    assert!(header.contains("전화_기관명,팩스_기관명"));
    let row = csv.lines().nth(1).context("result row missing")?;
    assert!(row.contains(",삼청동주민센터,삼청동주민센터,60,"));
    assert_eq!(engine.totals().owners, 1);
    Ok(())
}
