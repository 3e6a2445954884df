use anyhow::Result;
use clap::{Args, Subcommand};

use tessera_data::{Query, Setting, SettingValue};
use tessera_db::Connection;

use crate::formatting::PrintFormatted;

#[derive(Subcommand, Debug)]
pub enum Settings {
    /// List all settings
    #[clap(name = "list")]
    List,
    /// Show a setting
    #[clap(name = "get")]
    Get(GetSetting),
    /// Write a setting
    #[clap(name = "set")]
    Set(SetSetting),
}

impl Settings {
    pub async fn run(self, db: &Connection) -> Result<()> {
        match self {
            Settings::List => {
                let settings: Vec<Setting> = db.query(&()).await?;
                settings.print_formatted();
                Ok(())
            }
            Settings::Get(cmd) => cmd.run(db).await,
            Settings::Set(cmd) => cmd.run(db).await,
        }
    }
}

#[derive(Args, Debug)]
pub struct GetSetting {
    pub key: String,
}

impl GetSetting {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let value = db
            .get_setting(&self.key, SettingValue::Text(String::new()))
            .await?;
        println!("{}", value.encode()?);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SetSetting {
    pub key: String,
    /// JSON value; anything else is stored as text
    pub value: String,
}

impl SetSetting {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let value = SettingValue::decode(&self.value).unwrap_or(SettingValue::Text(self.value));
        let setting = db.put_setting(&self.key, value).await?;
        setting.print_formatted();
        Ok(())
    }
}
