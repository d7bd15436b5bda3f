use anyhow::Context;
use clap::Parser;
use contact_etl::domain::services::fax::summarize;
use contact_etl::domain::services::phone::{area_code, is_valid_format, normalize};
use contact_etl::domain::services::region::region_name;
use contact_etl::domain::services::{classify, validate_fax};

#[derive(Parser)]
#[command(name = "check-number")]
#[command(about = "Validate phone/fax numbers against a known phone and address")]
struct Args {
    /// Numbers to check
    #[arg(required = true)]
    numbers: Vec<String>,

    /// Known phone number of the institution
    #[arg(long, default_value = "")]
    phone: String,

    /// Institution address
    #[arg(long, default_value = "")]
    address: String,

    /// Reject on any area-code or region finding
    #[arg(long)]
    strict: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut reports = Vec::new();
    for number in &args.numbers {
        let normalized = normalize(number);
        let code = area_code(&normalized);
        let verdict = validate_fax(number, &args.phone, &args.address, args.strict);
        reports.push(serde_json::json!({
            "input": number,
            "normalized": normalized,
            "valid_format": is_valid_format(&normalized),
            "area_code": code,
            "region": region_name(&code),
            "phone_class": classify(&normalized, &args.address),
            "fax_verdict": verdict,
        }));

        if !args.json {
            println!("📞 {} → {}", number, normalized);
            println!("  지역: {} ({})", region_name(&code).unwrap_or("기타"), code);
            println!("  전화 분류: {}", classify(&normalized, &args.address));
            println!("  팩스 검증: {}", verdict);
        }
    }

    let summary = summarize(args.numbers.iter().map(String::as_str));
    if args.json {
        let output = serde_json::json!({ "results": reports, "summary": summary });
        let json = serde_json::to_string_pretty(&output).context("rendering JSON report")?;
        println!("{}", json);
    } else if args.numbers.len() > 1 {
        println!();
        println!(
            "📊 {}개 중 {}개 유효 ({:.1}%)",
            summary.total, summary.valid, summary.valid_rate
        );
        for (region, count) in &summary.area_distribution {
            println!("  {}: {}", region, count);
        }
    }

    Ok(())
}
