use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::env;
use std::path::Path;

/// Usage: cargo run -p pdf_qa_api --example client -- "question" a.pdf [b.pdf]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let mut args = env::args().skip(1);
    let question = args
        .next()
        .ok_or("usage: client <question> <pdf> [pdf]")?;
    let pdfs: Vec<String> = args.collect();

    let client = Client::new();

    println!("Health Check:");
    let health_response = client.get(format!("{}/health", base_url)).send().await?;
    println!("Status: {}", health_response.status());

    let mut form = Form::new().text("question", question);
    for pdf in &pdfs {
        let bytes = tokio::fs::read(pdf).await?;
        let filename = Path::new(pdf)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| pdf.clone());
        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;
        form = form.part("files", part);
    }

    println!("\nAsking over {} document(s):", pdfs.len());
    let ask_response = client
        .post(format!("{}/ask", base_url))
        .multipart(form)
        .send()
        .await?;

    println!("Status: {}", ask_response.status());
    let ask_json: serde_json::Value = ask_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&ask_json)?);

    Ok(())
}
