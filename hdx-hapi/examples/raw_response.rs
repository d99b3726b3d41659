use hdx_hapi::{Configuration, HapiClient};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let key = std::env::var("HDX_API_KEY")?;
    let client = HapiClient::new(Arc::new(Configuration::new(key)))?;

    // Make the request manually to see the actual structure
    let request = client
        .request(Method::GET, "/metadata/location")?
        .query(&[("limit", "2")]);
    let body = client.send_text(request).await?;

    let json: Value = serde_json::from_str(&body)?;
    println!("Raw JSON structure:");
    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(())
}
