use kube::CustomResourceExt as _;
use ssp::api::v1beta1::ssp::Ssp;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Ssp::crd())?);
    Ok(())
}
