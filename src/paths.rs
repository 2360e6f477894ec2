//! Bucket key layout. Every component that touches object storage goes
//! through these helpers; nothing else concatenates paths.

use uuid::Uuid;

fn join(parts: &[&str]) -> String {
    parts.join("/")
}

fn dashboard_scope(company_id: Uuid, dashboard_id: Uuid, folder: &str) -> String {
    join(&[
        "companies",
        &company_id.to_string(),
        "dashboards",
        &dashboard_id.to_string(),
        folder,
    ])
}

fn applicant_doc_path(
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    folder: &str,
    file_name: &str,
) -> String {
    join(&[
        &dashboard_scope(company_id, dashboard_id, folder),
        &applicant_id.to_string(),
        file_name,
    ])
}

pub fn original_doc_path(
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    file_name: &str,
) -> String {
    applicant_doc_path(company_id, dashboard_id, applicant_id, "originals", file_name)
}

pub fn fixed_doc_path(
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    file_name: &str,
) -> String {
    applicant_doc_path(company_id, dashboard_id, applicant_id, "fixed", file_name)
}

pub fn accepted_doc_path(
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    file_name: &str,
) -> String {
    applicant_doc_path(company_id, dashboard_id, applicant_id, "accepted", file_name)
}

pub fn rejected_doc_path(
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    file_name: &str,
) -> String {
    applicant_doc_path(company_id, dashboard_id, applicant_id, "rejected", file_name)
}

pub fn final_doc_path(
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    file_name: &str,
) -> String {
    applicant_doc_path(company_id, dashboard_id, applicant_id, "final", file_name)
}

pub fn sample_path(company_id: Uuid, dashboard_id: Uuid, file_name: &str) -> String {
    join(&[&dashboard_scope(company_id, dashboard_id, "samples"), file_name])
}

pub fn new_sample_path(company_id: Uuid, dashboard_id: Uuid, file_name: &str) -> String {
    join(&[
        &dashboard_scope(company_id, dashboard_id, "new-samples"),
        file_name,
    ])
}

pub fn temporary_doc_path(file_name: &str) -> String {
    join(&["temporary-docs", file_name])
}

pub fn logo_path(file_name: &str) -> String {
    join(&["logos", file_name])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid, Uuid) {
        (
            Uuid::parse_str("6d9c1a04-21c8-4df1-b2dc-0f91f3e8c01a").unwrap(),
            Uuid::parse_str("e51f9fbc-36d3-4b55-9f62-08a2ea9ff755").unwrap(),
            Uuid::parse_str("b2f3bc57-1f3e-4dbb-b9d0-3cbdc1ba1f70").unwrap(),
        )
    }

    #[test]
    fn applicant_folders_are_scoped_by_company_dashboard_applicant() {
        let (company, dashboard, applicant) = ids();
        assert_eq!(
            original_doc_path(company, dashboard, applicant, "passport-1.jpeg"),
            format!("companies/{company}/dashboards/{dashboard}/originals/{applicant}/passport-1.jpeg")
        );
        assert_eq!(
            fixed_doc_path(company, dashboard, applicant, "passport-1.pdf"),
            format!("companies/{company}/dashboards/{dashboard}/fixed/{applicant}/passport-1.pdf")
        );
        assert_eq!(
            final_doc_path(company, dashboard, applicant, "passport.pdf"),
            format!("companies/{company}/dashboards/{dashboard}/final/{applicant}/passport.pdf")
        );
    }

    #[test]
    fn same_inputs_same_path() {
        let (company, dashboard, applicant) = ids();
        assert_eq!(
            accepted_doc_path(company, dashboard, applicant, "a.pdf"),
            accepted_doc_path(company, dashboard, applicant, "a.pdf")
        );
    }

    #[test]
    fn dashboard_and_global_folders() {
        let (company, dashboard, _) = ids();
        assert_eq!(
            sample_path(company, dashboard, "visa.pdf"),
            format!("companies/{company}/dashboards/{dashboard}/samples/visa.pdf")
        );
        assert_eq!(
            new_sample_path(company, dashboard, "visa.pdf"),
            format!("companies/{company}/dashboards/{dashboard}/new-samples/visa.pdf")
        );
        assert_eq!(temporary_doc_path("upload-1"), "temporary-docs/upload-1");
        assert_eq!(logo_path("acme.png"), "logos/acme.png");
    }
}
