use anyhow::Result;

use crate::client::TempMailClient;

pub async fn run(api_url: &str, address: &str, password: &str) -> Result<()> {
    let client = TempMailClient::new(api_url)?;
    let account = client.generate_email(address, password).await?;

    println!("Created {}", account.address);
    println!("Account id: {}", account.id);
    println!("Quota: {} bytes", account.quota);
    Ok(())
}
