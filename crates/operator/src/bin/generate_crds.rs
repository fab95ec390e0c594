use gitops_operator::crd::GitOpsConfig;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    println!("---");
    println!("# GitOpsConfig CRD");
    println!("{}", serde_yaml::to_string(&GitOpsConfig::crd())?);
    Ok(())
}
